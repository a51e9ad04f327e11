use axum::{
    extract::{Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::issuer::IssuerError;
use crate::state::AppState;

/// Every path the router does not own goes to the issuer, response untouched.
pub async fn delegate(State(state): State<AppState>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    match state.issuer.fetch(&state.issuer_config, request).await {
        Ok(response) => response,
        Err(IssuerError::PayloadTooLarge { limit }) => {
            warn!(%path, limit, "request body over limit");
            (StatusCode::PAYLOAD_TOO_LARGE, "payload too large").into_response()
        }
        Err(e) => {
            error!(error = %e, %path, "issuer failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
        }
    }
}
