use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::DatabaseError;

// ============================================================================
// Database
// ============================================================================

#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database connection and run migrations
    ///
    /// `path` is a file path, or `:memory:` for a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::InstanceLocked` if another process holds the
    /// database locked (SQLITE_BUSY, SQLITE_LOCKED, SQLITE_CANTOPEN).
    /// Returns `DatabaseError::Migration` if the schema could not be created.
    pub async fn open(path: &str) -> Result<Self, DatabaseError> {
        let url = format!("sqlite:{}?mode=rwc", path);

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(DatabaseError::from_sqlx)?
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");

        // An in-memory database exists per connection, so it must never be
        // served by more than one.
        let max_connections = if path == ":memory:" { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(DatabaseError::from_sqlx)?;

        let db = Self { pool };
        db.migrate().await.map_err(|e| match DatabaseError::from_sqlx(e) {
            DatabaseError::Other(inner) => DatabaseError::Migration(inner.to_string()),
            other => other,
        })?;
        tracing::debug!(path = %path, "Opened category database");
        Ok(db)
    }

    /// Run database migrations atomically within a transaction.
    ///
    /// Every statement uses `IF NOT EXISTS`, so re-running on an existing
    /// database is a no-op.
    async fn migrate(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS course_categories (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                idnumber TEXT,
                description TEXT,
                descriptionformat INTEGER NOT NULL DEFAULT 0,
                parent INTEGER NOT NULL DEFAULT 0,
                sortorder INTEGER NOT NULL DEFAULT 0,
                visible INTEGER NOT NULL DEFAULT 1,
                visibleold INTEGER NOT NULL DEFAULT 1,
                depth INTEGER NOT NULL DEFAULT 0,
                path TEXT NOT NULL DEFAULT '',
                timemodified INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY,
                category INTEGER NOT NULL,
                sortorder INTEGER NOT NULL DEFAULT 0,
                fullname TEXT NOT NULL,
                shortname TEXT NOT NULL,
                idnumber TEXT,
                summary TEXT,
                visible INTEGER NOT NULL DEFAULT 1,
                visibleold INTEGER NOT NULL DEFAULT 1,
                timecreated INTEGER NOT NULL DEFAULT 0,
                timemodified INTEGER NOT NULL DEFAULT 0
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS course_contacts (
                id INTEGER PRIMARY KEY,
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                full_name TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS course_tags (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                tag TEXT NOT NULL,
                PRIMARY KEY (course_id, tag)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS course_modules (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                module TEXT NOT NULL,
                PRIMARY KEY (course_id, module)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS enrolments (
                course_id INTEGER NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                user_id INTEGER NOT NULL,
                PRIMARY KEY (course_id, user_id)
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        // Site settings (key-value), e.g. defaultrequestcategory
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                name TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_categories_parent ON course_categories(parent, sortorder)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_categories_path ON course_categories(path)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_courses_category ON courses(category, sortorder)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_enrolments_user ON enrolments(user_id)")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }
}
