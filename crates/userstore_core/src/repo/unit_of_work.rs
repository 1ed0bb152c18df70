//! Transactional write unit.
//!
//! A unit is a value: an ordered list of inserts followed by a count of
//! `users`, executed inside one `IMMEDIATE` transaction.
//!
//! # Invariants
//! - Inserts run in submission order; results keep that order.
//! - The count is read inside the same transaction, after the last insert.
//! - Any failing step aborts the unit; the transaction rolls back on drop and
//!   the step's error is returned unchanged.

use crate::model::user::{NewUser, User};
use crate::repo::user_repo::{count_users, insert_user, RepoResult};
use log::{debug, warn};
use rusqlite::{Connection, TransactionBehavior};

/// Ordered inserts to run atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOfWork {
    inserts: Vec<NewUser>,
}

impl UnitOfWork {
    pub fn new(inserts: Vec<NewUser>) -> Self {
        Self { inserts }
    }

    /// Appends one insert, preserving submission order.
    pub fn insert(mut self, new_user: NewUser) -> Self {
        self.inserts.push(new_user);
        self
    }

    pub fn inserts(&self) -> &[NewUser] {
        &self.inserts
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
    }
}

/// Committed result of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitOutcome {
    /// Created records in submission order.
    pub created: Vec<User>,
    /// `COUNT(*)` of users observed after the last insert, before commit.
    pub total_users: i64,
}

pub(crate) fn run_unit(conn: &mut Connection, unit: &UnitOfWork) -> RepoResult<UnitOutcome> {
    // IMMEDIATE takes the write lock up front so no other writer can slip in
    // between the inserts and the count.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let mut created = Vec::with_capacity(unit.inserts.len());
    for (step, new_user) in unit.inserts.iter().enumerate() {
        match insert_user(&tx, new_user) {
            Ok(user) => created.push(user),
            Err(err) => {
                warn!(
                    "event=unit_of_work module=repo status=rollback step={} steps={} error={}",
                    step,
                    unit.inserts.len(),
                    err
                );
                return Err(err);
            }
        }
    }

    let total_users = count_users(&tx)?;
    tx.commit()?;

    debug!(
        "event=unit_of_work module=repo status=ok steps={} total_users={}",
        created.len(),
        total_users
    );
    Ok(UnitOutcome {
        created,
        total_users,
    })
}
