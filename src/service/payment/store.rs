use chrono::{DateTime, Utc};
use libsql::{params, Row};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    service::auth::parse_timestamp,
    storage::{opt_text, text_or_null, StorageError, TursoClient},
};

/// Append-only record of a billing event.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub id: String,
    pub user_id: String,
    pub product_id: Option<String>,
    #[serde(skip_serializing)]
    pub stripe_event_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub amount_cents: i64,
    pub currency: String,
    pub status: String,
    pub event_type: String,
    pub created_at: DateTime<Utc>,
}

impl PaymentRecord {
    pub fn new(user_id: &str, event_type: &str, status: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            product_id: None,
            stripe_event_id: None,
            stripe_subscription_id: None,
            amount_cents: 0,
            currency: "usd".to_string(),
            status: status.to_string(),
            event_type: event_type.to_string(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct PaymentStore {
    db: TursoClient,
}

impl PaymentStore {
    pub fn new(db: TursoClient) -> Self {
        Self { db }
    }

    pub async fn record(&self, payment: &PaymentRecord) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "INSERT INTO payments
                (id, user_id, product_id, stripe_event_id, stripe_subscription_id, amount_cents, currency, status, event_type, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                payment.id.as_str(),
                payment.user_id.as_str(),
                text_or_null(payment.product_id.as_deref()),
                text_or_null(payment.stripe_event_id.as_deref()),
                text_or_null(payment.stripe_subscription_id.as_deref()),
                payment.amount_cents,
                payment.currency.as_str(),
                payment.status.as_str(),
                payment.event_type.as_str(),
                payment.created_at.to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn event_recorded(&self, stripe_event_id: &str) -> Result<bool, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query("SELECT 1 FROM payments WHERE stripe_event_id = ?1 LIMIT 1", [stripe_event_id])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<PaymentRecord>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, user_id, product_id, stripe_event_id, stripe_subscription_id, amount_cents, currency,
                        status, event_type, created_at
                 FROM payments WHERE user_id = ?1 ORDER BY created_at DESC",
                [user_id],
            )
            .await?;

        let mut payments = Vec::new();
        while let Some(row) = rows.next().await? {
            payments.push(payment_from_row(&row)?);
        }
        Ok(payments)
    }
}

fn payment_from_row(row: &Row) -> Result<PaymentRecord, StorageError> {
    Ok(PaymentRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        product_id: opt_text(row, 2)?,
        stripe_event_id: opt_text(row, 3)?,
        stripe_subscription_id: opt_text(row, 4)?,
        amount_cents: row.get(5)?,
        currency: row.get(6)?,
        status: row.get(7)?,
        event_type: row.get(8)?,
        created_at: parse_timestamp(&row.get::<String>(9)?)?,
    })
}
