use sqlx::PgPool;

pub(crate) use crate::users::repo_types::User;

impl User {
    /// Insert the email, or touch nothing if it already exists, and return the row.
    ///
    /// The conflict branch is an update so that `RETURNING` yields the existing row.
    pub(crate) async fn upsert_by_email(
        db: &PgPool,
        email: &str,
    ) -> Result<Option<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO "user" (email)
            VALUES ($1)
            ON CONFLICT (email) DO UPDATE SET email = "user".email
            RETURNING id, email, created_at
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Find a user by email.
    #[cfg(test)]
    pub(crate) async fn find_by_email(db: &PgPool, email: &str) -> Result<Vec<User>, sqlx::Error> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, created_at
            FROM "user"
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_all(db)
        .await
    }
}
