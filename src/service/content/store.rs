use libsql::{params, Row};

use super::{Course, Lesson, SoftwareDownload, TradingRoom};
use crate::{
    service::product::Tier,
    storage::{opt_text, text_or_null, StorageError, TursoClient},
};

#[derive(Clone)]
pub struct ContentStore {
    db: TursoClient,
}

impl ContentStore {
    pub fn new(db: TursoClient) -> Self {
        Self { db }
    }

    pub async fn courses(&self) -> Result<Vec<Course>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, title, description, required_tier, sort_order FROM courses ORDER BY sort_order, title",
                (),
            )
            .await?;

        let mut courses = Vec::new();
        while let Some(row) = rows.next().await? {
            courses.push(course_from_row(&row)?);
        }
        Ok(courses)
    }

    pub async fn course(&self, id: &str) -> Result<Option<Course>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, title, description, required_tier, sort_order FROM courses WHERE id = ?1 LIMIT 1",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(course_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn lessons(&self, course_id: &str) -> Result<Vec<Lesson>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, course_id, title, content, video_url, sort_order
                 FROM lessons WHERE course_id = ?1 ORDER BY sort_order, title",
                [course_id],
            )
            .await?;

        let mut lessons = Vec::new();
        while let Some(row) = rows.next().await? {
            lessons.push(Lesson {
                id: row.get(0)?,
                course_id: row.get(1)?,
                title: row.get(2)?,
                content: row.get(3)?,
                video_url: opt_text(&row, 4)?,
                sort_order: row.get(5)?,
            });
        }
        Ok(lessons)
    }

    pub async fn downloads(&self) -> Result<Vec<SoftwareDownload>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, product_id, name, file_name, drive_file_id, required_tier, version
                 FROM software_downloads ORDER BY name",
                (),
            )
            .await?;

        let mut downloads = Vec::new();
        while let Some(row) = rows.next().await? {
            downloads.push(download_from_row(&row)?);
        }
        Ok(downloads)
    }

    pub async fn download(&self, id: &str) -> Result<Option<SoftwareDownload>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, product_id, name, file_name, drive_file_id, required_tier, version
                 FROM software_downloads WHERE id = ?1 LIMIT 1",
                [id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(download_from_row(&row)?)),
            None => Ok(None),
        }
    }

    pub async fn rooms(&self) -> Result<Vec<TradingRoom>, StorageError> {
        let conn = self.db.get_connection();
        let mut rows = conn
            .query(
                "SELECT id, name, description, zoom_meeting_id, required_tier FROM trading_rooms ORDER BY name",
                (),
            )
            .await?;

        let mut rooms = Vec::new();
        while let Some(row) = rows.next().await? {
            rooms.push(TradingRoom {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                zoom_meeting_id: row.get(3)?,
                required_tier: tier_at(&row, 4)?,
            });
        }
        Ok(rooms)
    }

    pub async fn upsert_course(&self, course: &Course, lessons: &[Lesson]) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "INSERT OR REPLACE INTO courses (id, title, description, required_tier, sort_order)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                course.id.as_str(),
                course.title.as_str(),
                course.description.as_str(),
                course.required_tier.to_string(),
                course.sort_order,
            ],
        )
        .await?;

        for lesson in lessons {
            conn.execute(
                "INSERT OR REPLACE INTO lessons (id, course_id, title, content, video_url, sort_order)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    lesson.id.as_str(),
                    course.id.as_str(),
                    lesson.title.as_str(),
                    lesson.content.as_str(),
                    text_or_null(lesson.video_url.as_deref()),
                    lesson.sort_order,
                ],
            )
            .await?;
        }
        Ok(())
    }

    pub async fn upsert_download(&self, download: &SoftwareDownload) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "INSERT OR REPLACE INTO software_downloads
                (id, product_id, name, file_name, drive_file_id, required_tier, version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                download.id.as_str(),
                text_or_null(download.product_id.as_deref()),
                download.name.as_str(),
                download.file_name.as_str(),
                download.drive_file_id.as_str(),
                download.required_tier.to_string(),
                download.version.as_str(),
            ],
        )
        .await?;
        Ok(())
    }

    pub async fn upsert_room(&self, room: &TradingRoom) -> Result<(), StorageError> {
        let conn = self.db.get_connection();
        conn.execute(
            "INSERT OR REPLACE INTO trading_rooms (id, name, description, zoom_meeting_id, required_tier)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                room.id.as_str(),
                room.name.as_str(),
                room.description.as_str(),
                room.zoom_meeting_id.as_str(),
                room.required_tier.to_string(),
            ],
        )
        .await?;
        Ok(())
    }
}

fn tier_at(row: &Row, idx: i32) -> Result<Tier, StorageError> {
    row.get::<String>(idx)?.parse().map_err(StorageError::CorruptRow)
}

fn course_from_row(row: &Row) -> Result<Course, StorageError> {
    Ok(Course {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        required_tier: tier_at(row, 3)?,
        sort_order: row.get(4)?,
    })
}

fn download_from_row(row: &Row) -> Result<SoftwareDownload, StorageError> {
    Ok(SoftwareDownload {
        id: row.get(0)?,
        product_id: opt_text(row, 1)?,
        name: row.get(2)?,
        file_name: row.get(3)?,
        drive_file_id: row.get(4)?,
        required_tier: tier_at(row, 5)?,
        version: row.get(6)?,
    })
}
