//! Diagnostic endpoints: a sample authorization request and a callback echo.
//! Neither validates anything.

use axum::{
    extract::Request,
    http::{header, uri::Authority, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{instrument, warn};
use url::Url;

pub const DEMO_CLIENT_ID: &str = "your-client-id";
pub const CALLBACK_PATH: &str = "/callback";
const AUTHORIZE_PATH: &str = "/authorize";

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    pub message: &'static str,
    pub params: Map<String, Value>,
}

fn web_scheme(raw: &str) -> Option<&'static str> {
    match raw.trim() {
        s if s.eq_ignore_ascii_case("https") => Some("https"),
        s if s.eq_ignore_ascii_case("http") => Some("http"),
        _ => None,
    }
}

/// Host and port only; userinfo would let `Host` smuggle in another target.
fn plain_authority(raw: &str) -> Option<Authority> {
    let authority: Authority = raw.trim().parse().ok()?;
    (!authority.as_str().contains('@') && !authority.host().is_empty()).then_some(authority)
}

/// `scheme://host[:port]` the request was addressed to.
///
/// Only `http` and `https` are produced. An unknown `X-Forwarded-Proto`
/// falls back to `http`; the first entry of a proxy chain wins.
fn request_origin(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if let (Some(scheme), Some(authority)) = (uri.scheme_str(), uri.authority()) {
        let scheme = web_scheme(scheme)?;
        let authority = plain_authority(authority.as_str())?;
        return Some(format!("{scheme}://{authority}"));
    }
    let host = plain_authority(headers.get(header::HOST)?.to_str().ok()?)?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .and_then(web_scheme)
        .unwrap_or("http");
    Some(format!("{scheme}://{host}"))
}

pub(crate) fn authorize_url(origin: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(origin)?;
    url.set_path(AUTHORIZE_PATH);
    url.set_query(query);

    let redirect_uri = format!("{origin}{CALLBACK_PATH}");
    let overrides = [
        ("redirect_uri", redirect_uri.as_str()),
        ("client_id", DEMO_CLIENT_ID),
        ("response_type", "code"),
    ];
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !overrides.iter().any(|(name, _)| k == name))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        pairs.extend_pairs(kept.iter());
        pairs.extend_pairs(overrides.iter());
    }
    Ok(url)
}

/// Any method on `/`: 302 into the authorization flow for the demo client.
#[instrument(skip_all)]
pub async fn root_redirect(request: Request) -> Response {
    let Some(origin) = request_origin(request.uri(), request.headers()) else {
        warn!(host = ?request.headers().get(header::HOST), "cannot determine request origin");
        return (StatusCode::BAD_REQUEST, "missing or invalid Host header").into_response();
    };
    match authorize_url(&origin, request.uri().query()) {
        Ok(url) => (StatusCode::FOUND, [(header::LOCATION, url.to_string())]).into_response(),
        Err(e) => {
            warn!(error = %e, %origin, "invalid request origin");
            (StatusCode::BAD_REQUEST, "invalid Host header").into_response()
        }
    }
}

/// Any method on `/callback`: echo the query string back as JSON.
pub async fn callback(uri: Uri) -> Json<CallbackResponse> {
    let mut params = Map::new();
    if let Some(query) = uri.query() {
        for (k, v) in url::form_urlencoded::parse(query.as_bytes()) {
            params.insert(k.into_owned(), Value::String(v.into_owned()));
        }
    }
    Json(CallbackResponse {
        message: "OAuth flow complete!",
        params,
    })
}
