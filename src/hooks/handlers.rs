use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use tracing::{error, instrument};

use super::dto::{
    segments, GetResponse, KeyRequest, ScanEntry, ScanRequest, ScanResponse, SendCodeRequest,
    SetRequest, UiConfigResponse,
};
use super::extractors::HookCaller;
use crate::issuer::{IssuerError, Subject, SuccessValue};
use crate::state::AppState;

fn hook_error(e: IssuerError) -> (StatusCode, String) {
    error!(error = %e, "issuer hook failed");
    match e {
        IssuerError::Email(_) => (StatusCode::BAD_GATEWAY, "email delivery failed".into()),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal error".into()),
    }
}

/// Theme, password copy and subject schema for the issuer's UI.
pub async fn ui_config(
    State(state): State<AppState>,
    _caller: HookCaller,
) -> impl IntoResponse {
    let config = &state.issuer_config;
    Json(UiConfigResponse {
        theme: &config.theme,
        copy: &config.providers.password.ui.copy,
        subjects: &config.subjects,
    })
    .into_response()
}

#[instrument(skip(state, _caller, body), fields(email = %body.email))]
pub async fn send_code(
    State(state): State<AppState>,
    _caller: HookCaller,
    Json(body): Json<SendCodeRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .issuer_config
        .send_code(&body.email, &body.code)
        .await
        .map_err(hook_error)?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, _caller))]
pub async fn success(
    State(state): State<AppState>,
    _caller: HookCaller,
    Json(value): Json<SuccessValue>,
) -> Result<Json<Subject>, (StatusCode, String)> {
    let subject = state.issuer_config.success(&value).await.map_err(hook_error)?;
    Ok(Json(subject))
}

pub async fn storage_get(
    State(state): State<AppState>,
    _caller: HookCaller,
    Json(body): Json<KeyRequest>,
) -> Result<Json<GetResponse>, (StatusCode, String)> {
    let value = state
        .issuer_config
        .storage
        .get(&segments(&body.key))
        .await
        .map_err(|e| hook_error(e.into()))?;
    Ok(Json(GetResponse { value }))
}

pub async fn storage_set(
    State(state): State<AppState>,
    _caller: HookCaller,
    Json(body): Json<SetRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .issuer_config
        .storage
        .set(&segments(&body.key), body.value, body.expiry)
        .await
        .map_err(|e| hook_error(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn storage_remove(
    State(state): State<AppState>,
    _caller: HookCaller,
    Json(body): Json<KeyRequest>,
) -> Result<StatusCode, (StatusCode, String)> {
    state
        .issuer_config
        .storage
        .remove(&segments(&body.key))
        .await
        .map_err(|e| hook_error(e.into()))?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn storage_scan(
    State(state): State<AppState>,
    _caller: HookCaller,
    Json(body): Json<ScanRequest>,
) -> Result<Json<ScanResponse>, (StatusCode, String)> {
    let entries = state
        .issuer_config
        .storage
        .scan(&segments(&body.prefix))
        .await
        .map_err(|e| hook_error(e.into()))?
        .into_iter()
        .map(|(key, value)| ScanEntry { key, value })
        .collect();
    Ok(Json(ScanResponse { entries }))
}
