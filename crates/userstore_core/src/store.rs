//! Process-wide store handle shared by request handlers.
//!
//! # Responsibility
//! - Own the single SQLite connection for the process lifetime.
//! - Run blocking repository work off the async workers.
//! - Bind every call to its caller: a dropped or timed-out call is skipped
//!   if still queued, or aborted at its next statement or commit if already
//!   running.
//!
//! # Invariants
//! - Connection access is exclusive per call and released on every exit path.
//! - Calls are serialized, so no call observes another's open transaction.
//! - A cancelled call never commits: its open transaction rolls back.
//! - After `close()`, every call fails with `StoreError::Closed`.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::repo::user_repo::{RepoError, RepoResult, SqliteUserRepository};
use crate::service::user_service::UserService;
use log::{debug, error, warn};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::os::raw::c_int;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// VM instructions between cancellation checks while a statement runs.
const CANCEL_CHECK_OPS: c_int = 8;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug)]
pub enum StoreError {
    Open(DbError),
    Repo(RepoError),
    Closed,
    Cancelled,
    TimedOut {
        operation: &'static str,
        timeout_ms: u128,
    },
    /// The blocking worker panicked or was aborted.
    Task(String),
    Poisoned,
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open(err) => write!(f, "failed to open store: {err}"),
            Self::Repo(err) => write!(f, "{err}"),
            Self::Closed => write!(f, "store is closed"),
            Self::Cancelled => write!(f, "store call cancelled"),
            Self::TimedOut {
                operation,
                timeout_ms,
            } => write!(f, "store call `{operation}` timed out after {timeout_ms}ms"),
            Self::Task(message) => write!(f, "store worker failed: {message}"),
            Self::Poisoned => write!(f, "store connection lock poisoned"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Open(err) => Some(err),
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for StoreError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::Interrupted => Self::Cancelled,
            other => Self::Repo(other),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Open(value)
    }
}

/// Cloneable handle to the shared connection.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
    call_timeout: Duration,
}

struct StoreInner {
    conn: Mutex<Option<Connection>>,
}

impl Store {
    /// Opens (and migrates) a file database. `:memory:` opens a private
    /// in-memory database.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = if path == Path::new(":memory:") {
            open_db_in_memory()?
        } else {
            open_db(path)?
        };
        Ok(Self::from_connection(conn))
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        Ok(Self::from_connection(open_db_in_memory()?))
    }

    /// Wraps an already migrated connection.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                conn: Mutex::new(Some(conn)),
            }),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Returns a handle sharing the same connection with a different per-call timeout.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Runs `f` with exclusive access to the connection on the blocking pool.
    ///
    /// # Errors
    /// - `TimedOut` when `f` does not finish within the call timeout.
    /// - `Cancelled` when the call was cancelled before or during execution.
    /// - `Repo` with the repository error returned by `f`, unchanged.
    pub async fn call<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> RepoResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let started_at = Instant::now();
        let token = CancellationToken::new();
        // Dropping the caller's future cancels the blocking work.
        let guard = token.clone().drop_guard();

        let inner = Arc::clone(&self.inner);
        let task = tokio::task::spawn_blocking(move || inner.run_exclusive(&token, f));

        let result = match tokio::time::timeout(self.call_timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StoreError::Task(join_err.to_string())),
            Err(_) => Err(StoreError::TimedOut {
                operation,
                timeout_ms: self.call_timeout.as_millis(),
            }),
        };

        let duration_ms = started_at.elapsed().as_millis();
        match &result {
            Ok(_) => {
                debug!("event=store_call module=store status=ok op={operation} duration_ms={duration_ms}");
            }
            Err(StoreError::Repo(err)) => {
                debug!(
                    "event=store_call module=store status=error op={operation} duration_ms={duration_ms} error={err}"
                );
            }
            Err(err) => {
                warn!(
                    "event=store_call module=store status=error op={operation} duration_ms={duration_ms} error={err}"
                );
            }
        }

        if matches!(result, Err(StoreError::TimedOut { .. })) {
            debug!("event=store_cancel module=store status=ok op={operation}");
        } else {
            guard.disarm();
        }
        result
    }

    /// Runs `f` against a `UserService` bound to the shared connection.
    pub async fn users<T, F>(&self, operation: &'static str, f: F) -> StoreResult<T>
    where
        F: for<'c> FnOnce(&mut UserService<SqliteUserRepository<'c>>) -> RepoResult<T>
            + Send
            + 'static,
        T: Send + 'static,
    {
        self.call(operation, move |conn| {
            let mut service = UserService::new(SqliteUserRepository::new(conn));
            f(&mut service)
        })
        .await
    }

    /// Closes the connection. Later calls fail with `StoreError::Closed`.
    pub fn close(&self) -> StoreResult<()> {
        let conn = self.inner.lock_conn()?.take();
        if let Some(conn) = conn {
            if let Err((_, err)) = conn.close() {
                error!("event=store_close module=store status=error error={err}");
                return Err(StoreError::Repo(err.into()));
            }
            debug!("event=store_close module=store status=ok");
        }
        Ok(())
    }
}

impl StoreInner {
    fn lock_conn(&self) -> StoreResult<MutexGuard<'_, Option<Connection>>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    fn run_exclusive<T, F>(&self, token: &CancellationToken, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> RepoResult<T>,
    {
        let mut slot = self.lock_conn()?;
        let conn = slot.as_mut().ok_or(StoreError::Closed)?;
        if token.is_cancelled() {
            return Err(StoreError::Cancelled);
        }

        watch_cancellation(conn, token);
        let result = f(conn);
        unwatch_cancellation(conn);

        match result {
            Ok(value) => Ok(value),
            // A rejected commit or aborted statement surfaces as the cancellation.
            Err(_) if token.is_cancelled() => Err(StoreError::Cancelled),
            Err(err) => Err(err.into()),
        }
    }
}

/// Aborts the running statement (`SQLITE_INTERRUPT`) and turns any commit
/// into a rollback once `token` is cancelled.
fn watch_cancellation(conn: &Connection, token: &CancellationToken) {
    let progress = AssertUnwindSafe(token.clone());
    conn.progress_handler(CANCEL_CHECK_OPS, Some(move || progress.is_cancelled()));
    let commit = AssertUnwindSafe(token.clone());
    conn.commit_hook(Some(move || commit.is_cancelled()));
}

fn unwatch_cancellation(conn: &Connection) {
    conn.progress_handler(0, None::<fn() -> bool>);
    conn.commit_hook(None::<fn() -> bool>);
}
