use async_trait::async_trait;
use reqwest::{header, Client, Response};
use serde::Deserialize;

use super::{LicenseError, LicensingProvider};
use crate::config::LicensingConfig;

const API_BASE_URL: &str = "https://go.netlicensing.io/core/v2/rest";

#[derive(Debug, Deserialize)]
struct Netlicensing {
    #[serde(default)]
    items: Option<Items>,
}

#[derive(Debug, Deserialize)]
struct Items {
    #[serde(default)]
    item: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    #[serde(rename = "type", default)]
    item_type: String,
    #[serde(default)]
    property: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct Property {
    name: String,
    value: String,
}

impl Item {
    fn property(&self, name: &str) -> Option<&str> {
        self.property.iter().find(|p| p.name == name).map(|p| p.value.as_str())
    }
}

impl Netlicensing {
    fn items(&self) -> &[Item] {
        self.items.as_ref().map(|items| items.item.as_slice()).unwrap_or_default()
    }

    fn number_of(&self, item_type: &str) -> Result<String, LicenseError> {
        self.items()
            .iter()
            .find(|item| item.item_type == item_type)
            .and_then(|item| item.property("number"))
            .map(str::to_string)
            .ok_or_else(|| LicenseError::InvalidResponse(format!("no {} number in response", item_type)))
    }

    /// Valid when at least one product module reports `valid=true` and none reports otherwise.
    fn is_valid(&self) -> bool {
        let mut verdicts = self.items().iter().filter_map(|item| item.property("valid")).peekable();
        verdicts.peek().is_some() && verdicts.all(|valid| valid == "true")
    }
}

pub struct NetLicensingProvider {
    client: Client,
    config: LicensingConfig,
}

impl NetLicensingProvider {
    pub fn new(client: Client, config: LicensingConfig) -> Self {
        Self { client, config }
    }

    async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> Result<Netlicensing, LicenseError> {
        let response = self
            .client
            .post(format!("{}{}", API_BASE_URL, path))
            .basic_auth("apiKey", Some(&self.config.api_key))
            .header(header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await?;

        parse_response(response).await
    }
}

async fn parse_response(response: Response) -> Result<Netlicensing, LicenseError> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(LicenseError::ApiError(format!("NetLicensing returned {}: {}", status, body)));
    }

    response
        .json::<Netlicensing>()
        .await
        .map_err(|e| LicenseError::InvalidResponse(e.to_string()))
}

#[async_trait]
impl LicensingProvider for NetLicensingProvider {
    async fn create_licensee(&self, product_number: &str, user_ref: &str) -> Result<String, LicenseError> {
        let response = self
            .post_form(
                "/licensee",
                &[("productNumber", product_number), ("active", "true"), ("name", user_ref)],
            )
            .await?;
        response.number_of("Licensee")
    }

    async fn create_license(&self, licensee_number: &str, template_number: &str) -> Result<String, LicenseError> {
        let response = self
            .post_form(
                "/license",
                &[
                    ("licenseeNumber", licensee_number),
                    ("licenseTemplateNumber", template_number),
                    ("active", "true"),
                ],
            )
            .await?;
        response.number_of("License")
    }

    async fn validate(&self, licensee_number: &str, product_number: &str) -> Result<bool, LicenseError> {
        let response = self
            .post_form(
                &format!("/licensee/{}/validate", licensee_number),
                &[("productNumber", product_number)],
            )
            .await?;
        Ok(response.is_valid())
    }
}
