pub mod admin;
pub mod auth;
pub mod config;
pub mod email;
pub mod notifications;
pub mod shared;
pub mod taxonomy;
pub mod tickets;

use std::sync::Arc;

use axum::Router;
use diesel_migrations::{embed_migrations, EmbeddedMigrations};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::shared::state::AppState;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Full API router with tracing and permissive CORS, ready to serve.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(auth::configure_auth_routes())
        .merge(tickets::configure_ticket_routes())
        .merge(taxonomy::configure_taxonomy_routes())
        .merge(notifications::configure_notification_routes())
        .merge(admin::configure_admin_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
