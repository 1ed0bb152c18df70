//! Route handlers.
//!
//! Each handler shapes its input, makes one store call and serializes the
//! result. Store calls finish (and commit) before the response is built.

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use userstore_core::{
    NewUser, UnitOfWork, User, UserFilter, UserId, UserListQuery, UserPatch, UserStats,
    UserWithProfile,
};
use uuid::Uuid;

// --- request bodies ---

#[derive(Debug, Deserialize)]
pub struct CreateUsersBody {
    pub users: Vec<NewUser>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListUsersParams {
    pub is_active: Option<bool>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

// --- response bodies ---

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatedUser {
    pub id: UserId,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateUserResponse {
    pub user: CreatedUser,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InsertedCount {
    pub inserted_count: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateUsersResponse {
    pub user: InsertedCount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ListUsersResponse {
    pub users: Vec<User>,
}

/// Keeps the `users` key for a single record, as existing clients expect.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct GetUserResponse {
    pub users: User,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct StatsResponse {
    pub stats: UserStats,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MatchedCount {
    pub matched_count: usize,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeactivateUsersResponse {
    pub total_users: MatchedCount,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PairTransactionResponse {
    pub user1: User,
    pub user2: User,
    pub total_users: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub users: Vec<User>,
    pub total_users: i64,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinResponse {
    pub users: Vec<UserWithProfile>,
}

// --- handlers ---

/// `POST /users`
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<NewUser>, JsonRejection>,
) -> ApiResult<Json<CreateUserResponse>> {
    let Json(new_user) = body.map_err(json_rejection)?;
    new_user.validate()?;

    let user = state
        .store
        .users("create_user", move |service| service.create_user(&new_user))
        .await?;

    Ok(Json(CreateUserResponse {
        user: CreatedUser { id: user.id },
    }))
}

/// `POST /users/batch`; rows colliding with existing users are skipped.
pub async fn create_users(
    State(state): State<AppState>,
    body: Result<Json<CreateUsersBody>, JsonRejection>,
) -> ApiResult<Json<CreateUsersResponse>> {
    let Json(CreateUsersBody { users }) = body.map_err(json_rejection)?;

    let summary = state
        .store
        .users("create_users", move |service| service.create_users(&users))
        .await?;

    Ok(Json(CreateUsersResponse {
        user: InsertedCount {
            inserted_count: summary.inserted_count,
        },
    }))
}

/// `GET /users`
pub async fn list_users(
    State(state): State<AppState>,
    params: Result<Query<ListUsersParams>, QueryRejection>,
) -> ApiResult<Json<ListUsersResponse>> {
    let Query(params) = params.map_err(|rejection| ApiError::Validation(rejection.body_text()))?;
    let query = UserListQuery {
        filter: UserFilter {
            email_suffix: None,
            is_active: params.is_active,
        },
        limit: params.limit,
        offset: params.offset.unwrap_or(0),
    };

    let users = state
        .store
        .users("list_users", move |service| service.list_users(&query))
        .await?;

    Ok(Json(ListUsersResponse { users }))
}

/// `GET /users/{id}`
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<GetUserResponse>> {
    let id = parse_user_id(&id)?;
    let user = state
        .store
        .users("get_user", move |service| service.get_user(id))
        .await?;

    Ok(Json(GetUserResponse { users: user }))
}

/// `GET /users/stats`
pub async fn user_stats(State(state): State<AppState>) -> ApiResult<Json<StatsResponse>> {
    let stats = state
        .store
        .users("user_stats", |service| service.stats())
        .await?;

    Ok(Json(StatsResponse { stats }))
}

/// `PUT /users/{id}`
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<UserPatch>, JsonRejection>,
) -> ApiResult<Json<UserResponse>> {
    let id = parse_user_id(&id)?;
    let Json(patch) = body.map_err(json_rejection)?;
    patch.validate()?;

    let user = state
        .store
        .users("update_user", move |service| service.update_user(id, &patch))
        .await?;

    Ok(Json(UserResponse { user }))
}

/// `PUT /users/batch`: deactivates every user in the configured email domain.
pub async fn deactivate_users(
    State(state): State<AppState>,
) -> ApiResult<Json<DeactivateUsersResponse>> {
    let domain = state.config.deactivate_domain.clone();
    let summary = state
        .store
        .users("deactivate_users", move |service| {
            service.deactivate_by_domain(&domain)
        })
        .await?;

    Ok(Json(DeactivateUsersResponse {
        total_users: MatchedCount {
            matched_count: summary.matched_count,
        },
    }))
}

/// `DELETE /users/{id}`
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let id = parse_user_id(&id)?;
    let user = state
        .store
        .users("delete_user", move |service| service.delete_user(id))
        .await?;

    Ok(Json(UserResponse { user }))
}

/// `GET /transactions`: two inserts and a count as one unit.
pub async fn run_pair_transaction(
    State(state): State<AppState>,
) -> ApiResult<Json<PairTransactionResponse>> {
    let token = Uuid::new_v4().simple().to_string();
    let unit = UnitOfWork::default()
        .insert(NewUser::new(
            "Transaction User 1",
            format!("tx1-{token}@email.com"),
        ))
        .insert(NewUser::new(
            "Transaction User 2",
            format!("tx2-{token}@email.com"),
        ));

    let outcome = state
        .store
        .users("run_pair_transaction", move |service| {
            service.run_in_transaction(&unit)
        })
        .await?;

    let total_users = outcome.total_users;
    let [user1, user2]: [User; 2] = outcome.created.try_into().map_err(|created: Vec<User>| {
        ApiError::Store(format!("expected 2 created users, got {}", created.len()))
    })?;

    Ok(Json(PairTransactionResponse {
        user1,
        user2,
        total_users,
    }))
}

/// `POST /transactions`: caller-supplied inserts and a count as one unit.
pub async fn run_transaction(
    State(state): State<AppState>,
    body: Result<Json<CreateUsersBody>, JsonRejection>,
) -> ApiResult<Json<TransactionResponse>> {
    let Json(CreateUsersBody { users }) = body.map_err(json_rejection)?;
    let unit = UnitOfWork::new(users);

    let outcome = state
        .store
        .users("run_transaction", move |service| {
            service.run_in_transaction(&unit)
        })
        .await?;

    Ok(Json(TransactionResponse {
        users: outcome.created,
        total_users: outcome.total_users,
    }))
}

/// `GET /users/join`
pub async fn list_users_with_profile(
    State(state): State<AppState>,
) -> ApiResult<Json<JoinResponse>> {
    let users = state
        .store
        .users("list_users_with_profile", |service| {
            service.list_users_with_profile()
        })
        .await?;

    Ok(Json(JoinResponse { users }))
}

/// Ids are opaque: anything that is not a stored id is simply not found.
fn parse_user_id(value: &str) -> ApiResult<UserId> {
    Uuid::parse_str(value).map_err(|_| ApiError::NotFound(format!("user not found: {value}")))
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    ApiError::Validation(rejection.body_text())
}
