//! Seam to the external identity issuer.
//!
//! The issuer owns the authorization protocol. This crate only builds its
//! configuration (storage, subjects, password provider, theme, success hook)
//! and hands requests over through [`Issuer::fetch`].

mod config;
mod storage;
mod subject;
mod upstream;

use async_trait::async_trait;
use axum::{extract::Request, response::Response};
use thiserror::Error;

use crate::{email::EmailError, users::UserError};

pub use config::{IssuerConfig, PasswordCopy, SuccessValue, Theme};
pub use storage::{spawn_sweeper, KvStorage, MemoryKvStorage, PgKvStorage, StorageError};
pub use subject::{Subject, SubjectSchema};
pub use upstream::UpstreamIssuer;

#[derive(Debug, Error)]
pub enum IssuerError {
    #[error(transparent)]
    Email(#[from] EmailError),
    #[error(transparent)]
    User(#[from] UserError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("invalid subject: {0}")]
    InvalidSubject(String),
    #[error("upstream issuer request failed: {0}")]
    Upstream(#[from] reqwest::Error),
    #[error("failed to read request body: {0}")]
    Body(String),
    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },
}

/// Handles every request the router does not answer itself.
#[async_trait]
pub trait Issuer: Send + Sync {
    async fn fetch(&self, config: &IssuerConfig, request: Request) -> Result<Response, IssuerError>;
}

#[cfg(test)]
pub(crate) use config::test_support;
