//! Callbacks for the issuer service.
//!
//! The upstream issuer cannot run our hooks in-process, so it calls them here:
//! code delivery, subject resolution, its key-value storage and the UI
//! configuration. Every route requires the shared hook secret.

mod dto;
mod extractors;
pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub const HOOKS_PREFIX: &str = "/hooks";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/config", get(handlers::ui_config))
        .route("/send-code", post(handlers::send_code))
        .route("/success", post(handlers::success))
        .route("/storage/get", post(handlers::storage_get))
        .route("/storage/set", post(handlers::storage_set))
        .route("/storage/remove", post(handlers::storage_remove))
        .route("/storage/scan", post(handlers::storage_scan))
}
