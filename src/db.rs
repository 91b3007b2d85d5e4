//! Database module
//!
//! Connection checks for the registration database read by the user
//! directory.

use sqlx::PgPool;

/// Columns the directory reads from `users`
const REQUIRED_USER_COLUMNS: &[&str] = &["username", "ethereum_address", "created_at"];

/// Verify database connectivity
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check that the `users` table has the columns the directory needs
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for column in REQUIRED_USER_COLUMNS {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = 'public' AND table_name = 'users' AND column_name = $1
            )
            "#,
        )
        .bind(column)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required column 'users.{}' does not exist", column);
            return Ok(false);
        }
    }

    Ok(true)
}
