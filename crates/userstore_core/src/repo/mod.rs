//! Repository layer contracts and SQLite persistence.
//!
//! # Responsibility
//! - Define use-case oriented data access contracts for users.
//! - Keep SQL details out of service and HTTP layers.
//!
//! # Invariants
//! - Write paths validate input before any SQL mutation.
//! - All values reach SQL through bound parameters.
//! - Repository APIs return semantic errors (`NotFound`, `Constraint`) in
//!   addition to DB transport errors.

pub mod unit_of_work;
pub mod user_repo;
