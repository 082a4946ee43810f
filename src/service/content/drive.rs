use async_trait::async_trait;
use axum::body::Body;
use reqwest::{header, Client};

use super::{ContentError, FileContent, FileStore};
use crate::config::DriveConfig;

const API_BASE_URL: &str = "https://www.googleapis.com/drive/v3/files";

pub struct GoogleDriveFileStore {
    client: Client,
    config: DriveConfig,
}

impl GoogleDriveFileStore {
    pub fn new(client: Client, config: DriveConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl FileStore for GoogleDriveFileStore {
    async fn open(&self, file_id: &str) -> Result<FileContent, ContentError> {
        let response = self
            .client
            .get(format!("{}/{}", API_BASE_URL, file_id))
            .query(&[("alt", "media"), ("key", self.config.api_key.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ContentError::Provider(format!(
                "Google Drive returned {} for {}: {}",
                status, file_id, body
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(FileContent {
            content_type,
            content_length: response.content_length(),
            body: Body::from_stream(response.bytes_stream()),
        })
    }
}
