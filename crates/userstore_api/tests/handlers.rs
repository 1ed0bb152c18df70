use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use userstore_api::handlers::{self, CreateUsersBody, ListUsersParams};
use userstore_api::{ApiConfig, ApiError, AppState};
use userstore_core::{NewUser, Profile, Store, UserPatch};

fn state() -> AppState {
    AppState::new(Store::open_in_memory().unwrap(), ApiConfig::default())
}

async fn create(state: &AppState, name: &str, email: &str) -> String {
    let Json(response) = handlers::create_user(
        State(state.clone()),
        Ok(Json(NewUser::new(name, email))),
    )
    .await
    .unwrap();
    response.user.id.to_string()
}

#[tokio::test]
async fn create_then_get_returns_matching_fields() {
    let state = state();
    let id = create(&state, "Ann", "ann@email.com").await;

    let Json(response) = handlers::get_user(State(state.clone()), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(response.users.id.to_string(), id);
    assert_eq!(response.users.name, "Ann");
    assert_eq!(response.users.email, "ann@email.com");
}

#[tokio::test]
async fn create_rejects_invalid_email_as_validation_error() {
    let state = state();
    let err = handlers::create_user(
        State(state.clone()),
        Ok(Json(NewUser::new("Ann", "no-at-sign"))),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Validation(_)));
    assert_eq!(err.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn create_duplicate_is_conflict() {
    let state = state();
    create(&state, "Ann", "ann@email.com").await;

    let err = handlers::create_user(
        State(state.clone()),
        Ok(Json(NewUser::new("Ann 2", "ann@email.com"))),
    )
    .await
    .unwrap_err();
    assert_eq!(err.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_or_malformed_ids_are_not_found() {
    let state = state();
    let err = handlers::get_user(State(state.clone()), Path("not-a-uuid".to_string()))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);

    let err = handlers::delete_user(
        State(state.clone()),
        Path(uuid::Uuid::new_v4().to_string()),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn batch_create_reports_inserted_count() {
    let state = state();
    create(&state, "Ann", "ann@email.com").await;

    let Json(response) = handlers::create_users(
        State(state.clone()),
        Ok(Json(CreateUsersBody {
            users: vec![
                NewUser::new("Ann", "ann@email.com"),
                NewUser::new("Bob", "bob@email.com"),
            ],
        })),
    )
    .await
    .unwrap();
    assert_eq!(response.user.inserted_count, 1);

    let Json(listed) = handlers::list_users(
        State(state.clone()),
        Ok(Query(ListUsersParams::default())),
    )
    .await
    .unwrap();
    assert_eq!(listed.users.len(), 2);
}

#[tokio::test]
async fn empty_batch_reports_zero_inserted() {
    let state = state();
    let Json(response) = handlers::create_users(
        State(state.clone()),
        Ok(Json(CreateUsersBody { users: Vec::new() })),
    )
    .await
    .unwrap();
    assert_eq!(response.user.inserted_count, 0);
}

#[tokio::test]
async fn update_then_deactivate_domain() {
    let state = state();
    let ann = create(&state, "Ann", "ann@email.com").await;
    let bob = create(&state, "Bob", "bob@other.org").await;

    for id in [&ann, &bob] {
        let Json(updated) = handlers::update_user(
            State(state.clone()),
            Path(id.clone()),
            Ok(Json(UserPatch {
                age: Some(30),
                is_active: Some(true),
                ..UserPatch::default()
            })),
        )
        .await
        .unwrap();
        assert_eq!(updated.user.age, Some(30));
    }

    let Json(response) = handlers::deactivate_users(State(state.clone()))
        .await
        .unwrap();
    assert_eq!(response.total_users.matched_count, 1);

    let Json(active) = handlers::list_users(
        State(state.clone()),
        Ok(Query(ListUsersParams {
            is_active: Some(true),
            ..ListUsersParams::default()
        })),
    )
    .await
    .unwrap();
    assert_eq!(active.users.len(), 1);
    assert_eq!(active.users[0].id.to_string(), bob);
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let state = state();
    let id = create(&state, "Ann", "ann@email.com").await;

    let Json(deleted) = handlers::delete_user(State(state.clone()), Path(id.clone()))
        .await
        .unwrap();
    assert_eq!(deleted.user.email, "ann@email.com");

    let err = handlers::get_user(State(state.clone()), Path(id))
        .await
        .unwrap_err();
    assert_eq!(err.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stats_reflect_ages() {
    let state = state();
    for (index, age) in [20, 30, 40].into_iter().enumerate() {
        let id = create(&state, "User", &format!("u{index}@email.com")).await;
        handlers::update_user(
            State(state.clone()),
            Path(id),
            Ok(Json(UserPatch {
                age: Some(age),
                ..UserPatch::default()
            })),
        )
        .await
        .unwrap();
    }

    let Json(response) = handlers::user_stats(State(state.clone())).await.unwrap();
    assert_eq!(response.stats.total_emails, 3);
    assert_eq!(response.stats.oldest_person, Some(40));
    assert_eq!(response.stats.youngest_person, Some(20));
    assert_eq!(response.stats.average_age, Some(30.0));
}

#[tokio::test]
async fn pair_transaction_commits_both_users_and_counts() {
    let state = state();
    create(&state, "Seed", "seed@email.com").await;

    let Json(first) = handlers::run_pair_transaction(State(state.clone()))
        .await
        .unwrap();
    assert_eq!(first.total_users, 3);
    assert_ne!(first.user1.id, first.user2.id);

    let Json(second) = handlers::run_pair_transaction(State(state.clone()))
        .await
        .unwrap();
    assert_eq!(second.total_users, 5);
}

#[tokio::test]
async fn failed_transaction_leaves_no_trace() {
    let state = state();
    create(&state, "Taken", "taken@email.com").await;

    let err = handlers::run_transaction(
        State(state.clone()),
        Ok(Json(CreateUsersBody {
            users: vec![
                NewUser::new("Fresh", "fresh@email.com"),
                NewUser::new("Clash", "taken@email.com"),
            ],
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::ConstraintViolation(_)));

    let Json(listed) = handlers::list_users(
        State(state.clone()),
        Ok(Query(ListUsersParams::default())),
    )
    .await
    .unwrap();
    assert_eq!(listed.users.len(), 1);
}

#[tokio::test]
async fn join_includes_profiles() {
    let state = state();
    let id = create(&state, "Ann", "ann@email.com").await;
    let user_id = uuid::Uuid::parse_str(&id).unwrap();
    state
        .store
        .users("set_profile", move |service| {
            service.set_profile(
                user_id,
                &Profile {
                    github_handle: Some("ann".to_string()),
                    twitter_handle: Some("@ann".to_string()),
                },
            )
        })
        .await
        .unwrap();
    create(&state, "Bob", "bob@email.com").await;

    let Json(response) = handlers::list_users_with_profile(State(state.clone()))
        .await
        .unwrap();
    assert_eq!(response.users.len(), 2);
    assert_eq!(
        response.users[0]
            .profile
            .as_ref()
            .and_then(|profile| profile.github_handle.as_deref()),
        Some("ann")
    );
    assert!(response.users[1].profile.is_none());
}
