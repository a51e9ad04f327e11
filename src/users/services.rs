use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, instrument};
use uuid::Uuid;

use super::repo::User;

#[derive(Debug, Error)]
pub enum UserError {
    #[error("unable to process user: {email}")]
    Unprocessable { email: String },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Resolves an email address to a durable user id, creating the user on first sight.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_or_create(&self, email: &str) -> Result<Uuid, UserError>;
}

#[derive(Clone)]
pub struct PgUserDirectory {
    db: PgPool,
}

impl PgUserDirectory {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    #[instrument(skip(self))]
    async fn get_or_create(&self, email: &str) -> Result<Uuid, UserError> {
        let row = User::upsert_by_email(&self.db, email).await.map_err(|e| {
            error!(error = %e, %email, "user upsert failed");
            UserError::from(e)
        })?;
        let user = resolve_row(row, email)?;
        info!(
            user_id = %user.id,
            email = %user.email,
            created_at = %user.created_at,
            "found or created user"
        );
        Ok(user.id)
    }
}

fn resolve_row(row: Option<User>, email: &str) -> Result<User, UserError> {
    row.ok_or_else(|| {
        error!(%email, "upsert returned no row");
        UserError::Unprocessable {
            email: email.to_string(),
        }
    })
}
