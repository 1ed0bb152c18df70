//! User repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide CRUD, batch and aggregate APIs over the `users` table.
//! - Provide the read-only `profiles` join and its seeding helper.
//!
//! # Invariants
//! - Write paths call `validate()` before SQL mutations.
//! - Read paths reject invalid persisted state instead of masking it.
//! - Multi-row writes run inside one `IMMEDIATE` transaction.

use crate::db::DbError;
use crate::model::user::{
    NewUser, Profile, User, UserId, UserPatch, UserValidationError, UserWithProfile,
};
use crate::repo::unit_of_work::{run_unit, UnitOfWork, UnitOutcome};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row, TransactionBehavior};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

const USER_SELECT_SQL: &str = "SELECT
    id,
    name,
    email,
    age,
    is_active
FROM users";

const USER_ORDER_SQL: &str = " ORDER BY created_at ASC, rowid ASC";

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for user persistence and query operations.
#[derive(Debug)]
pub enum RepoError {
    Validation(UserValidationError),
    Db(DbError),
    NotFound(UserId),
    /// Unique, foreign key or check constraint rejected the write.
    Constraint(String),
    /// The running statement was aborted because its call was cancelled.
    Interrupted,
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::NotFound(id) => write!(f, "user not found: {id}"),
            Self::Constraint(message) => write!(f, "constraint violation: {message}"),
            Self::Interrupted => write!(f, "statement interrupted"),
            Self::InvalidData(message) => write!(f, "invalid persisted user data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Validation(err) => Some(err),
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<UserValidationError> for RepoError {
    fn from(value: UserValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, message) = &value {
            match err.code {
                ErrorCode::ConstraintViolation => {
                    return Self::Constraint(message.clone().unwrap_or_else(|| err.to_string()));
                }
                ErrorCode::OperationInterrupted => return Self::Interrupted,
                _ => {}
            }
        }
        Self::Db(DbError::Sqlite(value))
    }
}

/// Row filter shared by list and batch update.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Exact, case-sensitive email suffix such as `@email.com`.
    pub email_suffix: Option<String>,
    pub is_active: Option<bool>,
}

/// Query options for listing users.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserListQuery {
    pub filter: UserFilter,
    pub limit: Option<u32>,
    pub offset: u32,
}

/// Result of a multi-row insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchInsertSummary {
    pub inserted_count: usize,
}

/// Result of a multi-row update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchUpdateSummary {
    pub matched_count: usize,
}

/// Columns of `users` usable with `COUNT`; NULLs are not counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserColumn {
    Email,
    Age,
}

impl UserColumn {
    fn sql_name(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Age => "age",
        }
    }
}

/// Numeric columns of `users`, usable with `MAX`/`MIN`/`AVG`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericColumn {
    Age,
}

impl NumericColumn {
    fn sql_name(self) -> &'static str {
        match self {
            Self::Age => "age",
        }
    }
}

/// Which aggregates to compute. Absent entries come back as `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AggregateSpec {
    pub count: Option<UserColumn>,
    pub max: Option<NumericColumn>,
    pub min: Option<NumericColumn>,
    pub avg: Option<NumericColumn>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AggregateSummary {
    pub count: Option<i64>,
    pub max: Option<i64>,
    pub min: Option<i64>,
    pub avg: Option<f64>,
}

/// Repository interface for user persistence.
pub trait UserRepository {
    fn create_user(&self, new_user: &NewUser) -> RepoResult<User>;
    fn create_users(
        &mut self,
        users: &[NewUser],
        skip_duplicates: bool,
    ) -> RepoResult<BatchInsertSummary>;
    fn get_user(&self, id: UserId) -> RepoResult<Option<User>>;
    fn list_users(&self, query: &UserListQuery) -> RepoResult<Vec<User>>;
    fn update_user(&self, id: UserId, patch: &UserPatch) -> RepoResult<User>;
    fn update_users(&self, filter: &UserFilter, patch: &UserPatch)
        -> RepoResult<BatchUpdateSummary>;
    fn delete_user(&mut self, id: UserId) -> RepoResult<User>;
    fn count_users(&self) -> RepoResult<i64>;
    fn aggregate_users(&self, spec: &AggregateSpec) -> RepoResult<AggregateSummary>;
    fn list_users_with_profile(&self) -> RepoResult<Vec<UserWithProfile>>;
    fn upsert_profile(&self, id: UserId, profile: &Profile) -> RepoResult<Profile>;
    /// Runs every insert of `unit` and a follow-up count as one transaction.
    fn run_in_transaction(&mut self, unit: &UnitOfWork) -> RepoResult<UnitOutcome>;
}

/// SQLite-backed user repository.
pub struct SqliteUserRepository<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> SqliteUserRepository<'conn> {
    /// Wraps a migrated connection.
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for SqliteUserRepository<'_> {
    fn create_user(&self, new_user: &NewUser) -> RepoResult<User> {
        insert_user(self.conn, new_user)
    }

    fn create_users(
        &mut self,
        users: &[NewUser],
        skip_duplicates: bool,
    ) -> RepoResult<BatchInsertSummary> {
        if users.is_empty() {
            return Ok(BatchInsertSummary { inserted_count: 0 });
        }
        for user in users {
            user.validate()?;
        }

        let sql = if skip_duplicates {
            "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3) ON CONFLICT DO NOTHING;"
        } else {
            "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3);"
        };

        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut inserted_count = 0;
        {
            let mut stmt = tx.prepare(sql)?;
            for user in users {
                inserted_count += stmt.execute(params![
                    Uuid::new_v4().to_string(),
                    user.name.as_str(),
                    user.email.as_str(),
                ])?;
            }
        }
        tx.commit()?;

        Ok(BatchInsertSummary { inserted_count })
    }

    fn get_user(&self, id: UserId) -> RepoResult<Option<User>> {
        select_user(self.conn, id)
    }

    fn list_users(&self, query: &UserListQuery) -> RepoResult<Vec<User>> {
        let mut sql = format!("{USER_SELECT_SQL} WHERE 1 = 1");
        let mut bind_values: Vec<Value> = Vec::new();
        push_filter(&mut sql, &mut bind_values, &query.filter);
        sql.push_str(USER_ORDER_SQL);

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bind_values.push(Value::Integer(i64::from(limit)));
            if query.offset > 0 {
                sql.push_str(" OFFSET ?");
                bind_values.push(Value::Integer(i64::from(query.offset)));
            }
        } else if query.offset > 0 {
            sql.push_str(" LIMIT -1 OFFSET ?");
            bind_values.push(Value::Integer(i64::from(query.offset)));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(bind_values))?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            users.push(parse_user_row(row)?);
        }

        Ok(users)
    }

    fn update_user(&self, id: UserId, patch: &UserPatch) -> RepoResult<User> {
        patch.validate()?;

        let changed = self.conn.execute(
            "UPDATE users
             SET
                name = COALESCE(?2, name),
                email = COALESCE(?3, email),
                age = COALESCE(?4, age),
                is_active = COALESCE(?5, is_active),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE id = ?1;",
            params![
                id.to_string(),
                patch.name.as_deref(),
                patch.email.as_deref(),
                patch.age,
                patch.is_active.map(bool_to_int),
            ],
        )?;

        if changed == 0 {
            return Err(RepoError::NotFound(id));
        }

        select_user(self.conn, id)?.ok_or(RepoError::NotFound(id))
    }

    fn update_users(
        &self,
        filter: &UserFilter,
        patch: &UserPatch,
    ) -> RepoResult<BatchUpdateSummary> {
        patch.validate()?;

        let mut sql = String::from(
            "UPDATE users
             SET
                name = COALESCE(?, name),
                email = COALESCE(?, email),
                age = COALESCE(?, age),
                is_active = COALESCE(?, is_active),
                updated_at = (strftime('%s', 'now') * 1000)
             WHERE 1 = 1",
        );
        let mut bind_values: Vec<Value> = vec![
            optional_text(patch.name.as_deref()),
            optional_text(patch.email.as_deref()),
            patch.age.map_or(Value::Null, Value::Integer),
            patch
                .is_active
                .map_or(Value::Null, |value| Value::Integer(bool_to_int(value))),
        ];
        push_filter(&mut sql, &mut bind_values, filter);

        let matched_count = self.conn.execute(&sql, params_from_iter(bind_values))?;
        Ok(BatchUpdateSummary { matched_count })
    }

    fn delete_user(&mut self, id: UserId) -> RepoResult<User> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let user = select_user(&tx, id)?.ok_or(RepoError::NotFound(id))?;
        tx.execute("DELETE FROM users WHERE id = ?1;", [id.to_string()])?;
        tx.commit()?;
        Ok(user)
    }

    fn count_users(&self) -> RepoResult<i64> {
        count_users(self.conn)
    }

    fn aggregate_users(&self, spec: &AggregateSpec) -> RepoResult<AggregateSummary> {
        // Every projected expression comes from a closed enum, never from input.
        let count_expr = spec
            .count
            .map_or("NULL".to_string(), |column| format!("COUNT({})", column.sql_name()));
        let max_expr = spec
            .max
            .map_or("NULL".to_string(), |column| format!("MAX({})", column.sql_name()));
        let min_expr = spec
            .min
            .map_or("NULL".to_string(), |column| format!("MIN({})", column.sql_name()));
        let avg_expr = spec
            .avg
            .map_or("NULL".to_string(), |column| format!("AVG({})", column.sql_name()));

        let summary = self.conn.query_row(
            &format!(
                "SELECT
                    {count_expr} AS count_value,
                    {max_expr} AS max_value,
                    {min_expr} AS min_value,
                    {avg_expr} AS avg_value
                 FROM users;"
            ),
            [],
            |row| {
                Ok(AggregateSummary {
                    count: row.get("count_value")?,
                    max: row.get("max_value")?,
                    min: row.get("min_value")?,
                    avg: row.get("avg_value")?,
                })
            },
        )?;

        Ok(summary)
    }

    fn list_users_with_profile(&self) -> RepoResult<Vec<UserWithProfile>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                u.id,
                u.name,
                u.email,
                p.user_id AS profile_user_id,
                p.github_handle,
                p.twitter_handle
             FROM users u
             LEFT JOIN profiles p ON p.user_id = u.id
             ORDER BY u.created_at ASC, u.rowid ASC;",
        )?;
        let mut rows = stmt.query([])?;
        let mut users = Vec::new();
        while let Some(row) = rows.next()? {
            let id_text: String = row.get("id")?;
            let profile = match row.get::<_, Option<String>>("profile_user_id")? {
                Some(_) => Some(Profile {
                    github_handle: row.get("github_handle")?,
                    twitter_handle: row.get("twitter_handle")?,
                }),
                None => None,
            };
            users.push(UserWithProfile {
                id: parse_user_id(&id_text)?,
                name: row.get("name")?,
                email: row.get("email")?,
                profile,
            });
        }
        Ok(users)
    }

    fn upsert_profile(&self, id: UserId, profile: &Profile) -> RepoResult<Profile> {
        if select_user(self.conn, id)?.is_none() {
            return Err(RepoError::NotFound(id));
        }

        self.conn.execute(
            "INSERT INTO profiles (user_id, github_handle, twitter_handle)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (user_id) DO UPDATE SET
                github_handle = excluded.github_handle,
                twitter_handle = excluded.twitter_handle,
                updated_at = (strftime('%s', 'now') * 1000);",
            params![
                id.to_string(),
                profile.github_handle.as_deref(),
                profile.twitter_handle.as_deref(),
            ],
        )?;

        Ok(profile.clone())
    }

    fn run_in_transaction(&mut self, unit: &UnitOfWork) -> RepoResult<UnitOutcome> {
        run_unit(self.conn, unit)
    }
}

/// Inserts one validated user. Works on a plain connection or inside a transaction.
pub(crate) fn insert_user(conn: &Connection, new_user: &NewUser) -> RepoResult<User> {
    new_user.validate()?;
    let user = new_user.clone().into_user();

    conn.execute(
        "INSERT INTO users (id, name, email, age, is_active) VALUES (?1, ?2, ?3, ?4, ?5);",
        params![
            user.id.to_string(),
            user.name.as_str(),
            user.email.as_str(),
            user.age,
            user.is_active.map(bool_to_int),
        ],
    )?;

    Ok(user)
}

pub(crate) fn count_users(conn: &Connection) -> RepoResult<i64> {
    let total = conn.query_row("SELECT COUNT(*) FROM users;", [], |row| row.get(0))?;
    Ok(total)
}

fn select_user(conn: &Connection, id: UserId) -> RepoResult<Option<User>> {
    let mut stmt = conn.prepare(&format!("{USER_SELECT_SQL} WHERE id = ?1;"))?;
    let mut rows = stmt.query([id.to_string()])?;
    if let Some(row) = rows.next()? {
        return Ok(Some(parse_user_row(row)?));
    }
    Ok(None)
}

fn push_filter(sql: &mut String, bind_values: &mut Vec<Value>, filter: &UserFilter) {
    if let Some(suffix) = filter.email_suffix.as_ref() {
        // substr() keeps the match exact and case-sensitive; LIKE would fold ASCII case.
        sql.push_str(" AND substr(email, -length(?)) = ?");
        bind_values.push(Value::Text(suffix.clone()));
        bind_values.push(Value::Text(suffix.clone()));
    }
    if let Some(is_active) = filter.is_active {
        sql.push_str(" AND is_active = ?");
        bind_values.push(Value::Integer(bool_to_int(is_active)));
    }
}

fn parse_user_row(row: &Row<'_>) -> RepoResult<User> {
    let id_text: String = row.get("id")?;
    let id = parse_user_id(&id_text)?;

    let is_active = match row.get::<_, Option<i64>>("is_active")? {
        None => None,
        Some(0) => Some(false),
        Some(1) => Some(true),
        Some(other) => {
            return Err(RepoError::InvalidData(format!(
                "invalid is_active value `{other}` in users.is_active"
            )));
        }
    };

    Ok(User {
        id,
        name: row.get("name")?,
        email: row.get("email")?,
        age: row.get("age")?,
        is_active,
    })
}

fn parse_user_id(value: &str) -> RepoResult<UserId> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid value `{value}` in users.id")))
}

fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

fn bool_to_int(value: bool) -> i64 {
    if value {
        1
    } else {
        0
    }
}
