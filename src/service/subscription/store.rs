use chrono::Utc;
use libsql::params;

use super::SubscriptionEntry;
use crate::storage::{StorageError, TursoClient};

/// Reads and writes the JSON subscription array kept per user.
#[derive(Clone)]
pub struct SubscriptionStore {
    db: TursoClient,
}

impl SubscriptionStore {
    pub fn new(db: TursoClient) -> Self {
        Self { db }
    }

    pub async fn load(&self, user_id: &str) -> Result<Vec<SubscriptionEntry>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT subscriptions FROM user_subscriptions WHERE user_id = ?1 LIMIT 1",
                [user_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(serde_json::from_str(&row.get::<String>(0)?)?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn save(&self, user_id: &str, entries: &[SubscriptionEntry]) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "INSERT INTO user_subscriptions (user_id, subscriptions, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id) DO UPDATE SET subscriptions = excluded.subscriptions, updated_at = excluded.updated_at",
            params![user_id, serde_json::to_string(entries)?, Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }

    pub async fn find_user_by_stripe_subscription(
        &self,
        stripe_subscription_id: &str,
    ) -> Result<Option<String>, StorageError> {
        self.find_user_by_field("$.stripeSubscriptionId", stripe_subscription_id)
            .await
    }

    pub async fn find_user_by_licensee(&self, licensee_number: &str) -> Result<Option<String>, StorageError> {
        self.find_user_by_field("$.licenseeNumber", licensee_number).await
    }

    async fn find_user_by_field(&self, path: &str, value: &str) -> Result<Option<String>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT user_id FROM user_subscriptions
                 WHERE EXISTS (
                     SELECT 1 FROM json_each(user_subscriptions.subscriptions)
                     WHERE json_extract(json_each.value, ?1) = ?2
                 )
                 LIMIT 1",
                params![path, value],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }
}
