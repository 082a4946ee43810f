mod drive;
mod model;
mod store;
mod zoom;

pub use drive::GoogleDriveFileStore;
pub use model::*;
pub use store::ContentStore;
pub use zoom::ZoomMeetingProvider;

use async_trait::async_trait;
use axum::body::Body;
use std::sync::Arc;

use crate::{
    service::{product::Tier, subscription::AccessSummary},
    storage::{StorageError, StorageManager},
};

#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("This content requires {0} access")]
    AccessDenied(Tier),
    #[error("Content provider error: {0}")]
    Provider(String),
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl From<reqwest::Error> for ContentError {
    fn from(error: reqwest::Error) -> Self {
        ContentError::Provider(error.to_string())
    }
}

pub struct FileContent {
    pub content_type: String,
    pub content_length: Option<u64>,
    pub body: Body,
}

#[async_trait]
pub trait MeetingProvider: Send + Sync {
    /// Meeting details with only the occurrences that have not ended yet.
    async fn meeting(&self, meeting_id: &str) -> Result<Meeting, ContentError>;
}

#[async_trait]
pub trait FileStore: Send + Sync {
    async fn open(&self, file_id: &str) -> Result<FileContent, ContentError>;
}

/// Serves member content gated by the caller's access summary.
#[derive(Clone)]
pub struct ContentService {
    store: ContentStore,
    meetings: Arc<dyn MeetingProvider>,
    files: Arc<dyn FileStore>,
}

impl ContentService {
    pub fn new(storage: &StorageManager, meetings: Arc<dyn MeetingProvider>, files: Arc<dyn FileStore>) -> Self {
        Self {
            store: ContentStore::new(storage.turso().clone()),
            meetings,
            files,
        }
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub async fn courses(&self, access: &AccessSummary) -> Result<Vec<Listed<Course>>, ContentError> {
        let courses = self.store.courses().await?;
        Ok(courses
            .into_iter()
            .map(|course| Listed {
                locked: !access.allows(course.required_tier),
                item: course,
            })
            .collect())
    }

    pub async fn course(&self, id: &str, access: &AccessSummary) -> Result<CourseDetail, ContentError> {
        let course = self
            .store
            .course(id)
            .await?
            .ok_or_else(|| ContentError::NotFound(format!("Course {}", id)))?;
        ensure_tier(access, course.required_tier)?;

        let lessons = self.store.lessons(&course.id).await?;
        Ok(CourseDetail { course, lessons })
    }

    pub async fn downloads(&self, access: &AccessSummary) -> Result<Vec<Listed<SoftwareDownload>>, ContentError> {
        let downloads = self.store.downloads().await?;
        Ok(downloads
            .into_iter()
            .map(|download| Listed {
                locked: !access.allows(download.required_tier),
                item: download,
            })
            .collect())
    }

    pub async fn open_download(
        &self,
        id: &str,
        access: &AccessSummary,
    ) -> Result<(SoftwareDownload, FileContent), ContentError> {
        let download = self
            .store
            .download(id)
            .await?
            .ok_or_else(|| ContentError::NotFound(format!("Download {}", id)))?;
        ensure_tier(access, download.required_tier)?;

        info!("Streaming {} ({})", download.file_name, download.id);
        let content = self.files.open(&download.drive_file_id).await?;
        Ok((download, content))
    }

    /// Rooms the caller may join, each with its upcoming sessions. A room whose
    /// schedule cannot be fetched is still listed, without sessions.
    pub async fn rooms(&self, access: &AccessSummary) -> Result<Vec<RoomSchedule>, ContentError> {
        let rooms = self.store.rooms().await?;
        let mut schedules = Vec::new();

        for room in rooms.into_iter().filter(|room| access.allows(room.required_tier)) {
            let schedule = match self.meetings.meeting(&room.zoom_meeting_id).await {
                Ok(meeting) => RoomSchedule {
                    room,
                    join_url: Some(meeting.join_url),
                    upcoming: meeting.occurrences,
                },
                Err(e) => {
                    warn!("Failed to load schedule for room {}: {}", room.id, e);
                    RoomSchedule {
                        room,
                        join_url: None,
                        upcoming: Vec::new(),
                    }
                }
            };
            schedules.push(schedule);
        }

        Ok(schedules)
    }
}

fn ensure_tier(access: &AccessSummary, tier: Tier) -> Result<(), ContentError> {
    if access.allows(tier) {
        Ok(())
    } else {
        Err(ContentError::AccessDenied(tier))
    }
}
