use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use secrecy::ExposeSecret;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::state::AppState;

/// Proof that the caller holds the issuer hook secret.
pub struct HookCaller;

#[async_trait]
impl FromRequestParts<AppState> for HookCaller {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .ok_or((StatusCode::UNAUTHORIZED, "missing Authorization header".into()))?;

        let token = auth
            .strip_prefix("Bearer ")
            .or_else(|| auth.strip_prefix("bearer "))
            .ok_or((StatusCode::UNAUTHORIZED, "invalid auth scheme".into()))?;

        let expected = state.config.upstream.hook_secret.expose_secret().as_bytes();
        if !bool::from(token.as_bytes().ct_eq(expected)) {
            warn!(path = %parts.uri.path(), "hook call with wrong secret");
            return Err((StatusCode::UNAUTHORIZED, "invalid hook secret".into()));
        }
        Ok(HookCaller)
    }
}
