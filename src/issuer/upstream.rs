use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    response::Response,
};
use http_body_util::LengthLimitError;
use tracing::{debug, instrument};
use url::Url;

use super::{Issuer, IssuerConfig, IssuerError};
use crate::config::UpstreamConfig;

/// Headers that describe a single hop and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::HOST,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
];

/// Delegates to an issuer service reachable over HTTP and relays its answer untouched.
///
/// The service reads the configuration back through the `/hooks` routes, so
/// nothing from [`IssuerConfig`] travels with the forwarded request.
#[derive(Clone)]
pub struct UpstreamIssuer {
    client: reqwest::Client,
    base: Url,
    forwarded_proto: HeaderValue,
    max_body_bytes: usize,
}

impl UpstreamIssuer {
    pub fn new(config: &UpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            // The issuer's redirects belong to the browser.
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base: Url::parse(&config.url)?,
            forwarded_proto: HeaderValue::from_str(&config.forwarded_proto)?,
            max_body_bytes: config.max_body_bytes,
        })
    }

    fn target(&self, path: &str, query: Option<&str>) -> Url {
        let mut target = self.base.clone();
        let joined = format!("{}{}", self.base.path().trim_end_matches('/'), path);
        target.set_path(&joined);
        target.set_query(query);
        target
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP.iter() {
        headers.remove(name);
    }
    headers.remove(header::CONTENT_LENGTH);
}

fn is_length_limit(err: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return true;
        }
        source = e.source();
    }
    false
}

fn declared_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

#[async_trait]
impl Issuer for UpstreamIssuer {
    #[instrument(skip_all, fields(method = %request.method(), path = %request.uri().path()))]
    async fn fetch(&self, _config: &IssuerConfig, request: Request) -> Result<Response, IssuerError> {
        let (parts, body) = request.into_parts();
        let target = self.target(parts.uri.path(), parts.uri.query());

        let limit = self.max_body_bytes;
        if declared_length(&parts.headers).is_some_and(|len| len > limit) {
            return Err(IssuerError::PayloadTooLarge { limit });
        }

        let mut headers = parts.headers;
        let host = headers.get(header::HOST).cloned();
        strip_hop_by_hop(&mut headers);
        if let Some(host) = host {
            headers.insert("x-forwarded-host", host);
        }
        if !headers.contains_key("x-forwarded-proto") {
            headers.insert("x-forwarded-proto", self.forwarded_proto.clone());
        }

        let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
            if is_length_limit(&e) {
                IssuerError::PayloadTooLarge { limit }
            } else {
                IssuerError::Body(e.to_string())
            }
        })?;

        debug!(%target, "forwarding to issuer");
        let upstream = self
            .client
            .request(parts.method, target)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        let bytes = upstream.bytes().await?;

        let mut response = Response::new(Body::from(bytes));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        Ok(response)
    }
}
