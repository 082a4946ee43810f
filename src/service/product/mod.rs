mod model;

pub use model::{Product, SubscriptionType, Tier};

use chrono::Utc;
use libsql::{params, Row};

use crate::storage::{StorageError, TursoClient};

const PRODUCT_COLUMNS: &str =
    "id, template_id, name, tier, trial_days, subscription_types, stripe_prices, product_license_template";

#[derive(Clone)]
pub struct ProductService {
    db: TursoClient,
}

impl ProductService {
    pub fn new(db: TursoClient) -> Self {
        Self { db }
    }

    pub async fn list(&self) -> Result<Vec<Product>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(&format!("SELECT {} FROM products ORDER BY tier, name", PRODUCT_COLUMNS), ())
            .await?;

        let mut products = Vec::new();
        while let Some(row) = rows.next().await? {
            products.push(product_from_row(&row)?);
        }
        Ok(products)
    }

    pub async fn get(&self, product_id: &str) -> Result<Option<Product>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                &format!("SELECT {} FROM products WHERE id = ?1 LIMIT 1", PRODUCT_COLUMNS),
                [product_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(product_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn upsert(&self, product: &Product) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "INSERT OR REPLACE INTO products
                (id, template_id, name, tier, trial_days, subscription_types, stripe_prices, product_license_template, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                product.id.as_str(),
                product.template_id.as_str(),
                product.name.as_str(),
                product.tier.to_string(),
                product.trial_days,
                serde_json::to_string(&product.subscription_types)?,
                serde_json::to_string(&product.stripe_prices)?,
                serde_json::to_string(&product.product_license_template)?,
                Utc::now().to_rfc3339(),
            ],
        )
        .await?;
        Ok(())
    }
}

fn product_from_row(row: &Row) -> Result<Product, StorageError> {
    let tier: String = row.get(3)?;
    Ok(Product {
        id: row.get(0)?,
        template_id: row.get(1)?,
        name: row.get(2)?,
        tier: tier.parse().map_err(StorageError::CorruptRow)?,
        trial_days: row.get(4)?,
        subscription_types: serde_json::from_str(&row.get::<String>(5)?)?,
        stripe_prices: serde_json::from_str(&row.get::<String>(6)?)?,
        product_license_template: serde_json::from_str(&row.get::<String>(7)?)?,
    })
}
