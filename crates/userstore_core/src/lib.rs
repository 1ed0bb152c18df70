//! Core domain logic for the user store.
//! This crate owns the data model, SQLite persistence and the shared store handle.

pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use logging::{default_log_level, init_logging, logging_status};
pub use model::user::{
    normalize_email_domain, NewUser, Profile, User, UserId, UserPatch, UserValidationError,
    UserWithProfile,
};
pub use repo::unit_of_work::{UnitOfWork, UnitOutcome};
pub use repo::user_repo::{
    AggregateSpec, AggregateSummary, BatchInsertSummary, BatchUpdateSummary, NumericColumn,
    RepoError, RepoResult, SqliteUserRepository, UserColumn, UserFilter, UserListQuery,
    UserRepository,
};
pub use service::user_service::{UserService, UserStats};
pub use store::{Store, StoreError, StoreResult, DEFAULT_CALL_TIMEOUT};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
