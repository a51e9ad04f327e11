use std::{net::SocketAddr, time::Duration};

use axum::{
    body::Body,
    http::{Request, Response},
    routing::any,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{field, info, info_span, warn, Span};

use crate::hooks::{self, HOOKS_PREFIX};
use crate::routes::{demo, issuer};
use crate::state::AppState;

/// Path only: queries carry codes and emails.
fn request_span(req: &Request<Body>) -> Span {
    info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        status = field::Empty,
        latency_ms = field::Empty,
    )
}

fn record_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", status.as_u16());
    span.record("latency_ms", latency.as_millis() as u64);
    if status.is_server_error() {
        tracing::error!(%status, "request failed");
    } else {
        tracing::debug!(%status, "request done");
    }
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/", any(demo::root_redirect))
        .route(demo::CALLBACK_PATH, any(demo::callback))
        .nest(HOOKS_PREFIX, hooks::router())
        .fallback(issuer::delegate)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(record_response),
        )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "ctrl-c handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}

pub async fn serve(app: Router, addr: SocketAddr) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{
        body::Body,
        extract::Request,
        http::{header, StatusCode},
        response::{IntoResponse, Response},
        Json,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use time::{Duration, OffsetDateTime};
    use tower::ServiceExt;
    use url::Url;

    use secrecy::SecretString;
    use wiremock::matchers::{body_partial_json, header as header_is, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::{EmailConfig, UpstreamConfig, DEFAULT_EMAIL_FROM};
    use crate::email::ResendSender;
    use crate::issuer::test_support::MemoryDirectory;
    use crate::issuer::{
        Issuer, IssuerConfig, IssuerError, MemoryKvStorage, SuccessValue, UpstreamIssuer,
    };

    const SECRET: &str = AppState::FAKE_HOOK_SECRET;

    /// Answers every request with a fixed, recognisable response.
    struct CannedIssuer;

    #[async_trait]
    impl Issuer for CannedIssuer {
        async fn fetch(&self, _config: &IssuerConfig, request: Request) -> Result<Response, IssuerError> {
            let path = request.uri().path().to_string();
            Ok((
                StatusCode::IM_A_TEAPOT,
                [("x-issuer", "canned")],
                format!("issuer saw {path}"),
            )
                .into_response())
        }
    }

    struct FailingIssuer;

    #[async_trait]
    impl Issuer for FailingIssuer {
        async fn fetch(&self, _config: &IssuerConfig, _request: Request) -> Result<Response, IssuerError> {
            Err(IssuerError::InvalidSubject("boom".into()))
        }
    }

    /// Minimal in-process issuer that drives the configured hooks:
    /// `/password/code?email=` stores and mails a code,
    /// `/password/verify?email=&code=` checks it and returns the subject.
    struct HookIssuer;

    fn query_param(request: &Request, name: &str) -> Option<String> {
        url::form_urlencoded::parse(request.uri().query()?.as_bytes())
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
    }

    #[async_trait]
    impl Issuer for HookIssuer {
        async fn fetch(&self, config: &IssuerConfig, request: Request) -> Result<Response, IssuerError> {
            let email = query_param(&request, "email").unwrap_or_default();
            match request.uri().path() {
                "/password/code" => {
                    let code = "246810";
                    let expiry = OffsetDateTime::now_utc() + Duration::minutes(5);
                    config
                        .storage
                        .set(&["password", "code", email.as_str()], json!(code), Some(expiry))
                        .await?;
                    config.send_code(&email, code).await?;
                    Ok(StatusCode::NO_CONTENT.into_response())
                }
                "/password/verify" => {
                    let expected = config.storage.get(&["password", "code", email.as_str()]).await?;
                    if expected != query_param(&request, "code").map(Value::String) {
                        return Ok(StatusCode::UNAUTHORIZED.into_response());
                    }
                    config.storage.remove(&["password", "code", email.as_str()]).await?;
                    let subject = config
                        .success(&SuccessValue {
                            provider: "password".into(),
                            email,
                        })
                        .await?;
                    Ok(Json(subject).into_response())
                }
                _ => Ok(StatusCode::NOT_FOUND.into_response()),
            }
        }
    }

    async fn body_json(response: Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str) -> Request {
        axum::http::Request::builder()
            .uri(uri)
            .header(header::HOST, "auth.example.com")
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn root_redirects_into_authorization_flow() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let response = app.oneshot(get("/")).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let url = Url::parse(location).unwrap();
        assert_eq!(url.origin().ascii_serialization(), "http://auth.example.com");
        assert_eq!(url.path(), "/authorize");

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "your-client-id");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["redirect_uri"], "http://auth.example.com/callback");
    }

    #[tokio::test]
    async fn root_redirect_answers_any_method() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/")
            .header(header::HOST, "auth.example.com")
            .header("x-forwarded-proto", "https")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::FOUND);
        let location = response.headers()[header::LOCATION].to_str().unwrap();
        assert!(location.starts_with("https://auth.example.com/authorize?"));
    }

    #[tokio::test]
    async fn callback_echoes_query_params() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let response = app.oneshot(get("/callback?foo=bar&baz=qux")).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "application/json"
        );
        assert_eq!(
            body_json(response).await,
            json!({ "message": "OAuth flow complete!", "params": { "foo": "bar", "baz": "qux" } })
        );
    }

    #[tokio::test]
    async fn callback_without_query_has_empty_params() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let response = app.oneshot(get("/callback")).await.unwrap();
        assert_eq!(body_json(response).await["params"], json!({}));
    }

    #[tokio::test]
    async fn callback_keeps_last_duplicate() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let response = app.oneshot(get("/callback?code=1&code=2")).await.unwrap();
        assert_eq!(body_json(response).await["params"], json!({ "code": "2" }));
    }

    #[tokio::test]
    async fn other_paths_return_issuer_response_unchanged() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let response = app.oneshot(get("/authorize?client_id=x")).await.unwrap();

        assert_eq!(response.status(), StatusCode::IM_A_TEAPOT);
        assert_eq!(response.headers()["x-issuer"], "canned");
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"issuer saw /authorize");
    }

    #[tokio::test]
    async fn issuer_failure_is_an_opaque_500() {
        let app = build_app(AppState::fake(Arc::new(FailingIssuer)));
        let response = app.oneshot(get("/token")).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"internal error");
    }

    #[tokio::test]
    async fn hooks_drive_code_delivery_and_subject_resolution() {
        let state = AppState::fake(Arc::new(HookIssuer));
        let app = build_app(state.clone());

        let sent = app
            .clone()
            .oneshot(get("/password/code?email=a%40example.com"))
            .await
            .unwrap();
        assert_eq!(sent.status(), StatusCode::NO_CONTENT);

        let wrong = app
            .clone()
            .oneshot(get("/password/verify?email=a%40example.com&code=000000"))
            .await
            .unwrap();
        assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);

        let ok = app
            .clone()
            .oneshot(get("/password/verify?email=a%40example.com&code=246810"))
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);
        let subject = body_json(ok).await;
        assert_eq!(subject["type"], "user");
        assert!(uuid::Uuid::parse_str(subject["properties"]["id"].as_str().unwrap()).is_ok());

        // Code is single use.
        let replay = app
            .oneshot(get("/password/verify?email=a%40example.com&code=246810"))
            .await
            .unwrap();
        assert_eq!(replay.status(), StatusCode::UNAUTHORIZED);
    }

    fn hook(uri: &str, body: Value, secret: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(secret) = secret {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {secret}"));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    /// Router wired like production: real upstream issuer and Resend sender,
    /// both pointed at mock servers.
    fn wired_app(issuer_url: &str, resend_url: &str) -> Router {
        let upstream = UpstreamConfig {
            url: issuer_url.into(),
            forwarded_proto: "https".into(),
            max_body_bytes: 64,
            hook_secret: SecretString::from(SECRET.to_string()),
        };
        let email = EmailConfig {
            api_url: format!("{resend_url}/emails"),
            api_key: SecretString::from("re_test".to_string()),
            from: DEFAULT_EMAIL_FROM.into(),
        };
        let issuer_config = Arc::new(IssuerConfig::new(
            Arc::new(MemoryKvStorage::new()),
            Arc::new(MemoryDirectory::default()),
            Arc::new(ResendSender::new(&email).unwrap()),
        ));
        let issuer = Arc::new(UpstreamIssuer::new(&upstream).unwrap());
        build_app(AppState::fake_with(issuer, issuer_config))
    }

    #[tokio::test]
    async fn upstream_issuer_is_relayed_and_calls_back_through_hooks() {
        let issuer = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/authorize"))
            .and(header_is("x-forwarded-host", "auth.example.com"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-issuer", "upstream")
                    .set_body_string("login page"),
            )
            .expect(1)
            .mount(&issuer)
            .await;
        let resend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .and(header_is("authorization", "Bearer re_test"))
            .and(body_partial_json(json!({ "to": "a@example.com" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "e1" })))
            .expect(1)
            .mount(&resend)
            .await;
        let app = wired_app(&issuer.uri(), &resend.uri());

        let relayed = app.clone().oneshot(get("/authorize?client_id=x")).await.unwrap();
        assert_eq!(relayed.status(), StatusCode::OK);
        assert_eq!(relayed.headers()["x-issuer"], "upstream");
        let bytes = relayed.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"login page");

        let sent = app
            .clone()
            .oneshot(hook(
                "/hooks/send-code",
                json!({ "email": "a@example.com", "code": "135790" }),
                Some(SECRET),
            ))
            .await
            .unwrap();
        assert_eq!(sent.status(), StatusCode::NO_CONTENT);

        let success = json!({ "provider": "password", "email": "a@example.com" });
        let first = app
            .clone()
            .oneshot(hook("/hooks/success", success.clone(), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(first.status(), StatusCode::OK);
        let first = body_json(first).await;
        assert_eq!(first["type"], "user");
        let again = app
            .clone()
            .oneshot(hook("/hooks/success", success, Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(body_json(again).await["properties"]["id"], first["properties"]["id"]);

        let ui = axum::http::Request::builder()
            .uri("/hooks/config")
            .header(header::AUTHORIZATION, format!("Bearer {SECRET}"))
            .body(Body::empty())
            .unwrap();
        let ui = body_json(app.oneshot(ui).await.unwrap()).await;
        assert_eq!(ui["theme"]["title"], "myAuth");
        assert_eq!(ui["copy"]["input_code"], "Ingresa tu código");
        assert_eq!(ui["subjects"], json!({ "user": ["id"] }));
    }

    #[tokio::test]
    async fn resend_rejection_is_a_bad_gateway_on_the_hook() {
        let resend = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/emails"))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid to"))
            .expect(1)
            .mount(&resend)
            .await;
        let app = wired_app("http://127.0.0.1:9", &resend.uri());

        let response = app
            .oneshot(hook(
                "/hooks/send-code",
                json!({ "email": "bad", "code": "1" }),
                Some(SECRET),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn oversized_body_is_413_and_never_forwarded() {
        let issuer = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&issuer)
            .await;
        let app = wired_app(&issuer.uri(), "http://127.0.0.1:9");

        let request = axum::http::Request::builder()
            .method("POST")
            .uri("/token")
            .header(header::HOST, "auth.example.com")
            .body(Body::from("x".repeat(65)))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn hook_routes_require_the_secret() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let body = json!({ "email": "a@example.com", "code": "1" });

        for secret in [None, Some("wrong"), Some("hook-secre")] {
            let response = app
                .clone()
                .oneshot(hook("/hooks/send-code", body.clone(), secret))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "secret {secret:?}");
        }

        let basic = axum::http::Request::builder()
            .uri("/hooks/config")
            .header(header::AUTHORIZATION, format!("Basic {SECRET}"))
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(basic).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn hook_storage_set_get_scan_remove() {
        let app = build_app(AppState::fake(Arc::new(CannedIssuer)));
        let expiry = (OffsetDateTime::now_utc() + Duration::minutes(5))
            .format(&time::format_description::well_known::Rfc3339)
            .unwrap();

        let set = app
            .clone()
            .oneshot(hook(
                "/hooks/storage/set",
                json!({ "key": ["oauth:code", "abc"], "value": { "sub": "u1" }, "expiry": expiry }),
                Some(SECRET),
            ))
            .await
            .unwrap();
        assert_eq!(set.status(), StatusCode::NO_CONTENT);

        let got = app
            .clone()
            .oneshot(hook("/hooks/storage/get", json!({ "key": ["oauth:code", "abc"] }), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(body_json(got).await, json!({ "value": { "sub": "u1" } }));

        let scanned = app
            .clone()
            .oneshot(hook("/hooks/storage/scan", json!({ "prefix": ["oauth:code"] }), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(
            body_json(scanned).await,
            json!({ "entries": [{ "key": ["oauth:code", "abc"], "value": { "sub": "u1" } }] })
        );

        let removed = app
            .clone()
            .oneshot(hook("/hooks/storage/remove", json!({ "key": ["oauth:code", "abc"] }), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(removed.status(), StatusCode::NO_CONTENT);

        let gone = app
            .oneshot(hook("/hooks/storage/get", json!({ "key": ["oauth:code", "abc"] }), Some(SECRET)))
            .await
            .unwrap();
        assert_eq!(body_json(gone).await, json!({ "value": null }));
    }
}
