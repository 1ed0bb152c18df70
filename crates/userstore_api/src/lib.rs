//! HTTP surface for the user store.
//!
//! # Responsibility
//! - Map routes onto single store calls and serialize their results.
//! - Translate store failures into the HTTP error taxonomy.
//!
//! # Invariants
//! - Handlers share one injected `Store`; there is no global client.
//! - A response is only built after its store call has returned.

use axum::routing::{get, post};
use axum::Router;
use log::info;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use userstore_core::Store;

pub mod config;
pub mod error;
pub mod handlers;

pub use config::{ApiConfig, DEFAULT_DEACTIVATE_DOMAIN};
pub use error::{ApiError, ApiResult};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub config: Arc<ApiConfig>,
}

impl AppState {
    pub fn new(store: Store, config: ApiConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

/// Builds the route table.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/users",
            post(handlers::create_user).get(handlers::list_users),
        )
        .route(
            "/users/batch",
            post(handlers::create_users).put(handlers::deactivate_users),
        )
        .route("/users/stats", get(handlers::user_stats))
        .route("/users/join", get(handlers::list_users_with_profile))
        .route(
            "/users/{id}",
            get(handlers::get_user)
                .put(handlers::update_user)
                .delete(handlers::delete_user),
        )
        .route(
            "/transactions",
            get(handlers::run_pair_transaction).post(handlers::run_transaction),
        )
        .with_state(state)
}

/// Binds `0.0.0.0:{port}`.
pub async fn bind(port: u16) -> std::io::Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port)).await
}

/// Serves until `shutdown` is cancelled, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let local_addr = listener.local_addr()?;
    info!("event=server_ready module=api status=ok addr={local_addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("event=server_stopped module=api status=ok addr={local_addr}");
    Ok(())
}
