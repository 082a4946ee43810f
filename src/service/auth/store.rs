use chrono::{DateTime, Utc};
use libsql::{params, Row};

use super::User;
use crate::storage::{opt_text, text_or_null, StorageError, TursoClient};

const USER_COLUMNS: &str = "id, email, password_hash, google_id, first_name, last_name, is_verified, \
                            stripe_customer_id, created_at, updated_at";

/// SQL access to the `users` table.
#[derive(Clone)]
pub struct UserStore {
    db: TursoClient,
}

impl UserStore {
    pub fn new(db: TursoClient) -> Self {
        Self { db }
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<User>, StorageError> {
        self.find_one("id", id).await
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, StorageError> {
        self.find_one("email", &email.to_lowercase()).await
    }

    pub async fn find_by_google_id(&self, google_id: &str) -> Result<Option<User>, StorageError> {
        self.find_one("google_id", google_id).await
    }

    async fn find_one(&self, column: &str, value: &str) -> Result<Option<User>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM users WHERE {} = ?1 LIMIT 1", USER_COLUMNS, column),
                [value],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(user_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn insert(&self, user: &User) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            &format!(
                "INSERT INTO users ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                USER_COLUMNS
            ),
            params![
                user.id.as_str(),
                user.email.as_str(),
                text_or_null(user.password_hash.as_deref()),
                text_or_null(user.google_id.as_deref()),
                user.first_name.as_str(),
                user.last_name.as_str(),
                user.is_verified as i64,
                text_or_null(user.stripe_customer_id.as_deref()),
                user.created_at.to_rfc3339(),
                user.updated_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn link_google_id(&self, user_id: &str, google_id: &str) -> Result<(), StorageError> {
        self.update_column(user_id, "google_id", google_id).await
    }

    pub async fn set_password_hash(&self, user_id: &str, hash: &str) -> Result<(), StorageError> {
        self.update_column(user_id, "password_hash", hash).await
    }

    pub async fn set_stripe_customer_id(&self, user_id: &str, customer_id: &str) -> Result<(), StorageError> {
        self.update_column(user_id, "stripe_customer_id", customer_id).await
    }

    pub async fn mark_verified(&self, user_id: &str) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "UPDATE users SET is_verified = 1, updated_at = ?2 WHERE id = ?1",
            params![user_id, Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }

    async fn update_column(&self, user_id: &str, column: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            &format!("UPDATE users SET {} = ?2, updated_at = ?3 WHERE id = ?1", column),
            params![user_id, value, Utc::now().to_rfc3339()],
        )
        .await?;
        Ok(())
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::CorruptRow(format!("bad timestamp {}: {}", raw, e)))
}

fn user_from_row(row: &Row) -> Result<User, StorageError> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        password_hash: opt_text(row, 2)?,
        google_id: opt_text(row, 3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        is_verified: row.get::<i64>(6)? != 0,
        stripe_customer_id: opt_text(row, 7)?,
        created_at: parse_timestamp(&row.get::<String>(8)?)?,
        updated_at: parse_timestamp(&row.get::<String>(9)?)?,
    })
}
