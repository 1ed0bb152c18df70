//! Domain model for the user store.
//!
//! # Responsibility
//! - Define the canonical `User` record and its write-side request shapes.
//! - Own shape validation that runs before any SQL mutation.
//!
//! # Invariants
//! - Every user is identified by a stable, system-generated `UserId`.
//! - Deletion is a hard delete; there are no tombstones.

pub mod user;
