use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{debug, error, instrument};

use super::dto::ResendEmail;
use crate::config::EmailConfig;

#[derive(Debug, Error)]
pub enum EmailError {
    #[error("email provider rejected the message ({status}): {body}")]
    Rejected { status: StatusCode, body: String },
    #[error("email transport failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Delivers a verification code to an email address.
#[async_trait]
pub trait CodeSender: Send + Sync {
    async fn send_code(&self, email: &str, code: &str) -> Result<(), EmailError>;
}

/// Sends codes through the Resend transactional email API. One attempt per call.
#[derive(Clone)]
pub struct ResendSender {
    client: reqwest::Client,
    api_url: String,
    api_key: SecretString,
    from: String,
}

impl ResendSender {
    pub fn new(config: &EmailConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: reqwest::Client, config: &EmailConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            from: config.from.clone(),
        }
    }

    async fn deliver(&self, email: &str, code: &str) -> Result<(), EmailError> {
        let body = ResendEmail::verification_code(&self.from, email, code);
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(%status, %body, "email provider rejected message");
            return Err(EmailError::Rejected { status, body });
        }
        debug!(%status, "verification email accepted");
        Ok(())
    }
}

#[async_trait]
impl CodeSender for ResendSender {
    #[instrument(skip(self, code))]
    async fn send_code(&self, email: &str, code: &str) -> Result<(), EmailError> {
        self.deliver(email, code).await.map_err(|e| {
            error!(error = %e, "sending verification email failed");
            e
        })
    }
}
