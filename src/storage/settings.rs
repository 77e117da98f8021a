use super::schema::Database;
use super::types::DatabaseError;

/// Setting that names the category new courses land in by default.
pub const DEFAULT_CATEGORY_SETTING: &str = "defaultrequestcategory";

impl Database {
    // ========================================================================
    // Site Settings Operations
    // ========================================================================

    /// Get a single setting value by name.
    pub async fn get_setting(&self, name: &str) -> Result<Option<String>, DatabaseError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|(value,)| value))
    }

    /// Set a setting value (UPSERT).
    pub async fn set_setting(&self, name: &str, value: &str) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO config (name, value, updated_at)
            VALUES (?, ?, datetime('now'))
            ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
        "#,
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn unset_setting(&self, name: &str) -> Result<(), DatabaseError> {
        sqlx::query("DELETE FROM config WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// The configured default category id, if set and numeric.
    pub async fn default_category_id(&self) -> Result<Option<i64>, DatabaseError> {
        let value = self.get_setting(DEFAULT_CATEGORY_SETTING).await?;
        Ok(value.and_then(|v| v.parse::<i64>().ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::DEFAULT_CATEGORY_SETTING;
    use crate::storage::Database;

    async fn test_db() -> Database {
        Database::open(":memory:").await.unwrap()
    }

    #[tokio::test]
    async fn test_get_setting_missing() {
        let db = test_db().await;
        assert_eq!(db.get_setting("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_setting_upsert() {
        let db = test_db().await;
        db.set_setting("theme", "boost").await.unwrap();
        db.set_setting("theme", "classic").await.unwrap();

        assert_eq!(
            db.get_setting("theme").await.unwrap(),
            Some("classic".to_string())
        );
    }

    #[tokio::test]
    async fn test_default_category_id_ignores_garbage() {
        let db = test_db().await;
        db.set_setting(DEFAULT_CATEGORY_SETTING, "not-a-number")
            .await
            .unwrap();
        assert_eq!(db.default_category_id().await.unwrap(), None);

        db.set_setting(DEFAULT_CATEGORY_SETTING, "12").await.unwrap();
        assert_eq!(db.default_category_id().await.unwrap(), Some(12));

        db.unset_setting(DEFAULT_CATEGORY_SETTING).await.unwrap();
        assert_eq!(db.default_category_id().await.unwrap(), None);
    }
}
