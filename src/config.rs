use std::{net::SocketAddr, time::Duration};

use secrecy::SecretString;

pub const DEFAULT_RESEND_API_URL: &str = "https://api.resend.com/emails";
pub const DEFAULT_EMAIL_FROM: &str = "santiago@casals.ar";
pub const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024;

/// Where the issuer keeps its own key-value state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl StorageBackend {
    fn parse(raw: &str) -> anyhow::Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown AUTH_STORAGE_BACKEND: {other}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub api_url: String,
    pub api_key: SecretString,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub namespace: String,
    pub sweep_interval: Duration,
}

/// How requests reach the issuer service and how it calls back.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    pub url: String,
    /// Sent as `X-Forwarded-Proto` when the client request did not carry one.
    pub forwarded_proto: String,
    /// Larger request bodies are answered with 413 instead of being forwarded.
    pub max_body_bytes: usize,
    /// Bearer token the issuer presents on `/hooks/*`.
    pub hook_secret: SecretString,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub listen_addr: SocketAddr,
    pub upstream: UpstreamConfig,
    pub email: EmailConfig,
    pub storage: StorageConfig,
}

fn parsed_or<T: std::str::FromStr>(name: &str, default: T) -> anyhow::Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid {name}: {e}")),
        Err(_) => Ok(default),
    }
}

fn forwarded_proto(raw: &str) -> anyhow::Result<String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        p @ ("http" | "https") => Ok(p.to_string()),
        other => anyhow::bail!("ISSUER_FORWARDED_PROTO must be http or https, got {other}"),
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let listen_addr = format!(
            "{}:{}",
            std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
        )
        .parse()?;
        let upstream = UpstreamConfig {
            url: std::env::var("ISSUER_UPSTREAM_URL")?,
            forwarded_proto: forwarded_proto(
                &std::env::var("ISSUER_FORWARDED_PROTO").unwrap_or_else(|_| "http".into()),
            )?,
            max_body_bytes: parsed_or("ISSUER_MAX_BODY_BYTES", DEFAULT_MAX_BODY_BYTES)?,
            hook_secret: SecretString::from(std::env::var("ISSUER_HOOK_SECRET")?),
        };
        let email = EmailConfig {
            api_url: std::env::var("RESEND_API_URL")
                .unwrap_or_else(|_| DEFAULT_RESEND_API_URL.into()),
            api_key: SecretString::from(std::env::var("RESEND_API_KEY")?),
            from: std::env::var("EMAIL_FROM").unwrap_or_else(|_| DEFAULT_EMAIL_FROM.into()),
        };
        let sweep_secs: u64 = parsed_or("AUTH_STORAGE_SWEEP_SECS", 60)?;
        anyhow::ensure!(sweep_secs > 0, "AUTH_STORAGE_SWEEP_SECS must be positive");
        let storage = StorageConfig {
            backend: std::env::var("AUTH_STORAGE_BACKEND")
                .ok()
                .map(|v| StorageBackend::parse(&v))
                .transpose()?
                .unwrap_or(StorageBackend::Postgres),
            namespace: std::env::var("AUTH_STORAGE_NAMESPACE").unwrap_or_else(|_| "auth".into()),
            sweep_interval: Duration::from_secs(sweep_secs),
        };
        Ok(Self {
            database_url,
            listen_addr,
            upstream,
            email,
            storage,
        })
    }
}
