use anyhow::Context;
use serde::Deserialize;

use super::{
    content::{Course, Lesson, SoftwareDownload, TradingRoom},
    product::Product,
    ServiceRegistry,
};
use crate::error::AppResult;

#[derive(Debug, Deserialize)]
pub struct CatalogCourse {
    #[serde(flatten)]
    pub course: Course,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
}

/// Products and member content kept in a deployable JSON file.
#[derive(Debug, Default, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub products: Vec<Product>,
    #[serde(default)]
    pub courses: Vec<CatalogCourse>,
    #[serde(default)]
    pub downloads: Vec<SoftwareDownload>,
    #[serde(default)]
    pub rooms: Vec<TradingRoom>,
}

impl Catalog {
    pub async fn load(path: &str) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read catalog {}", path))?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw).context("Failed to parse catalog")?)
    }

    /// Upserts every entry; rows missing from the file are left untouched.
    pub async fn apply(&self, services: &ServiceRegistry) -> AppResult<()> {
        for product in &self.products {
            services.products.upsert(product).await?;
        }

        let content = services.content.store();
        for entry in &self.courses {
            content.upsert_course(&entry.course, &entry.lessons).await?;
        }
        for download in &self.downloads {
            content.upsert_download(download).await?;
        }
        for room in &self.rooms {
            content.upsert_room(room).await?;
        }

        info!(
            "Catalog applied: {} products, {} courses, {} downloads, {} rooms",
            self.products.len(),
            self.courses.len(),
            self.downloads.len(),
            self.rooms.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        service::{product::Tier, subscription::AccessSummary},
        utils::test::setup_test_state,
    };

    const CATALOG: &str = r#"{
        "products": [{
            "id": "swing-pro",
            "templateId": "P-SWING",
            "name": "Swing Pro",
            "tier": "premium",
            "trialDays": 7,
            "subscriptionTypes": { "monthly": 9900 },
            "stripePrices": { "monthly": "price_swing_monthly" },
            "productLicenseTemplate": { "monthly": "T-SWING-M" }
        }],
        "courses": [{
            "id": "intro",
            "title": "Introduction",
            "requiredTier": "basic",
            "lessons": [{ "id": "intro-1", "title": "Welcome", "content": "Hello" }]
        }],
        "rooms": [{
            "id": "us-open",
            "name": "US open",
            "description": "",
            "zoomMeetingId": "111",
            "requiredTier": "premium"
        }]
    }"#;

    #[tokio::test]
    async fn test_apply_catalog() {
        let ctx = setup_test_state().await;
        let catalog = Catalog::parse(CATALOG).unwrap();
        catalog.apply(&ctx.state.services).await.unwrap();

        let product = ctx.state.services.products.get("swing-pro").await.unwrap().unwrap();
        assert_eq!(product.tier, Tier::Premium);
        assert_eq!(product.stripe_price(crate::service::product::SubscriptionType::Monthly), Some("price_swing_monthly"));

        let access = AccessSummary {
            has_basic_access: true,
            has_premium_access: false,
        };
        let course = ctx.state.services.content.course("intro", &access).await.unwrap();
        assert_eq!(course.lessons.len(), 1);
        assert_eq!(course.lessons[0].course_id, "intro");

        let rooms = ctx.state.services.content.store().rooms().await.unwrap();
        assert_eq!(rooms[0].zoom_meeting_id, "111");
    }

    #[test]
    fn test_parse_fills_optional_fields() {
        let catalog = Catalog::parse(
            r#"{
                "courses": [{
                    "id": "basics",
                    "title": "Basics",
                    "requiredTier": "basic",
                    "lessons": [{ "id": "basics-1", "title": "Charts" }]
                }],
                "rooms": [{ "id": "asia", "name": "Asia", "zoomMeetingId": "222", "requiredTier": "premium" }]
            }"#,
        )
        .unwrap();

        let lesson = &catalog.courses[0].lessons[0];
        assert_eq!(lesson.sort_order, 0);
        assert!(lesson.content.is_empty());
        assert!(lesson.video_url.is_none());
        assert!(catalog.rooms[0].description.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_catalog() {
        assert!(Catalog::parse("{\"products\": 3}").is_err());
    }
}
