use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,                   // server-generated
    pub email: String,              // unique key
    pub created_at: OffsetDateTime,
}
