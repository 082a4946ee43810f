use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Response};
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{ContentError, Meeting, MeetingOccurrence, MeetingProvider};
use crate::config::ZoomConfig;

const OAUTH_URL: &str = "https://zoom.us/oauth/token";
const API_BASE_URL: &str = "https://api.zoom.us/v2";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct MeetingResponse {
    #[serde(default)]
    topic: String,
    #[serde(default)]
    join_url: String,
    #[serde(default)]
    start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    occurrences: Vec<OccurrenceResponse>,
}

#[derive(Debug, Deserialize)]
struct OccurrenceResponse {
    start_time: DateTime<Utc>,
    #[serde(default)]
    duration: i64,
    #[serde(default)]
    status: String,
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Zoom server-to-server OAuth app reading meeting schedules.
pub struct ZoomMeetingProvider {
    client: Client,
    config: ZoomConfig,
    token: Mutex<Option<CachedToken>>,
}

impl ZoomMeetingProvider {
    pub fn new(client: Client, config: ZoomConfig) -> Self {
        Self {
            client,
            config,
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, ContentError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref().filter(|token| token.expires_at > Utc::now()) {
            return Ok(token.value.clone());
        }

        debug!("Requesting Zoom access token");
        let response = self
            .client
            .post(OAUTH_URL)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.config.account_id.as_str()),
            ])
            .send()
            .await?;
        let token: TokenResponse = check(response).await?.json().await?;

        // Refresh a minute early so a token never expires mid-request.
        let expires_at = Utc::now() + Duration::seconds(token.expires_in - 60);
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            expires_at,
        });
        Ok(token.access_token)
    }
}

async fn check(response: Response) -> Result<Response, ContentError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ContentError::Provider(format!("Zoom returned {}: {}", status, body)))
}

fn upcoming(meeting: MeetingResponse, now: DateTime<Utc>) -> Meeting {
    let mut occurrences: Vec<MeetingOccurrence> = if meeting.occurrences.is_empty() {
        meeting
            .start_time
            .map(|start_time| MeetingOccurrence {
                start_time,
                duration_minutes: meeting.duration,
            })
            .into_iter()
            .collect()
    } else {
        meeting
            .occurrences
            .into_iter()
            .filter(|occurrence| occurrence.status != "deleted")
            .map(|occurrence| MeetingOccurrence {
                start_time: occurrence.start_time,
                duration_minutes: occurrence.duration,
            })
            .collect()
    };

    occurrences.retain(|occurrence| occurrence.start_time + Duration::minutes(occurrence.duration_minutes) > now);
    occurrences.sort_by_key(|occurrence| occurrence.start_time);

    Meeting {
        topic: meeting.topic,
        join_url: meeting.join_url,
        occurrences,
    }
}

#[async_trait]
impl MeetingProvider for ZoomMeetingProvider {
    async fn meeting(&self, meeting_id: &str) -> Result<Meeting, ContentError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}/meetings/{}", API_BASE_URL, meeting_id))
            .bearer_auth(token)
            .send()
            .await?;
        let meeting: MeetingResponse = check(response).await?.json().await?;
        Ok(upcoming(meeting, Utc::now()))
    }
}
