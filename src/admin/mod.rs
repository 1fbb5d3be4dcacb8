//! Admin API.
//!
//! | Route | Purpose |
//! |---|---|
//! | `GET /admin/status` | daemon and generation status |
//! | `GET /admin/config` | current configuration (wire form) |
//! | `PUT /admin/config/{version}` | submit a versioned update |
//!
//! Every route requires `Authorization: Bearer <api key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, put},
    Router,
};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::orchestration::Orchestrator;

/// Shared state of the admin router.
#[derive(Clone)]
pub struct AdminState {
    pub orchestrator: Arc<Orchestrator>,
    pub api_key: Arc<str>,
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/config", get(get_config))
        .route("/admin/config/{version}", put(put_config))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
}
