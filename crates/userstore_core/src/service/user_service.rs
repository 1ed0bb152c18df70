//! User use-case service.
//!
//! # Responsibility
//! - Provide the CRUD, batch, stats and transaction entry points used by the
//!   HTTP handlers.
//! - Turn optional lookups into `NotFound` where callers expect a record.
//!
//! # Invariants
//! - Service APIs never bypass repository validation/persistence contracts.
//! - Service layer remains storage-agnostic.

use crate::model::user::{
    normalize_email_domain, NewUser, Profile, User, UserId, UserPatch, UserValidationError,
    UserWithProfile,
};
use crate::repo::unit_of_work::{UnitOfWork, UnitOutcome};
use crate::repo::user_repo::{
    AggregateSpec, BatchInsertSummary, BatchUpdateSummary, NumericColumn, RepoError, RepoResult,
    UserColumn, UserFilter, UserListQuery, UserRepository,
};
use serde::Serialize;

/// Age/email statistics over all users.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Number of users with an email.
    pub total_emails: i64,
    pub oldest_person: Option<i64>,
    pub youngest_person: Option<i64>,
    pub average_age: Option<f64>,
}

/// Use-case service wrapper for user operations.
pub struct UserService<R: UserRepository> {
    repo: R,
}

impl<R: UserRepository> UserService<R> {
    /// Creates a service using the provided repository implementation.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    pub fn create_user(&self, new_user: &NewUser) -> RepoResult<User> {
        self.repo.create_user(new_user)
    }

    /// Inserts all users, skipping rows that collide with existing ones.
    pub fn create_users(&mut self, users: &[NewUser]) -> RepoResult<BatchInsertSummary> {
        self.repo.create_users(users, true)
    }

    pub fn list_users(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        self.repo.list_users(query)
    }

    /// Gets one user by ID, failing with `NotFound` when absent.
    pub fn get_user(&self, id: UserId) -> RepoResult<User> {
        self.repo.get_user(id)?.ok_or(RepoError::NotFound(id))
    }

    /// Applies a partial update; absent fields stay unchanged.
    pub fn update_user(&self, id: UserId, patch: &UserPatch) -> RepoResult<User> {
        self.repo.update_user(id, patch)
    }

    /// Sets `is_active = false` for every user whose email ends with `domain`.
    pub fn deactivate_by_domain(&self, domain: &str) -> RepoResult<BatchUpdateSummary> {
        let filter = UserFilter {
            email_suffix: Some(normalize_email_domain(domain)?),
            is_active: None,
        };
        let patch = UserPatch {
            is_active: Some(false),
            ..UserPatch::default()
        };
        self.repo.update_users(&filter, &patch)
    }

    pub fn delete_user(&mut self, id: UserId) -> RepoResult<User> {
        self.repo.delete_user(id)
    }

    pub fn stats(&self) -> RepoResult<UserStats> {
        let summary = self.repo.aggregate_users(&AggregateSpec {
            count: Some(UserColumn::Email),
            max: Some(NumericColumn::Age),
            min: Some(NumericColumn::Age),
            avg: Some(NumericColumn::Age),
        })?;

        Ok(UserStats {
            total_emails: summary.count.unwrap_or(0),
            oldest_person: summary.max,
            youngest_person: summary.min,
            average_age: summary.avg,
        })
    }

    pub fn list_users_with_profile(&self) -> RepoResult<Vec<UserWithProfile>> {
        self.repo.list_users_with_profile()
    }

    pub fn set_profile(&self, id: UserId, profile: &Profile) -> RepoResult<Profile> {
        self.repo.upsert_profile(id, profile)
    }

    /// Runs `unit` atomically and returns the created users plus the total count.
    ///
    /// # Contract
    /// - Rejects an empty unit with a validation error.
    /// - The transaction is committed before this returns `Ok`.
    pub fn run_in_transaction(&mut self, unit: &UnitOfWork) -> RepoResult<UnitOutcome> {
        if unit.is_empty() {
            return Err(UserValidationError::EmptyBatch.into());
        }
        self.repo.run_in_transaction(unit)
    }
}
