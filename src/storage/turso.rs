use libsql::{Builder, Connection, Database, Row, Value};
use std::sync::Arc;

use super::StorageError;

#[derive(Clone)]
pub struct TursoClient {
    #[allow(dead_code)]
    inner: Arc<Database>,
    conn: Connection,
}

impl TursoClient {
    /// Connects to a remote Turso database, or opens a local file (or
    /// `:memory:`) when the url has no scheme.
    pub async fn new(url: &str, token: &str) -> Result<Self, StorageError> {
        info!("Initializing TursoClient...");
        let db = if url.starts_with("libsql://") || url.starts_with("https://") {
            Builder::new_remote(url.to_string(), token.to_string()).build().await?
        } else {
            Builder::new_local(url).build().await?
        };

        // A single shared connection keeps `:memory:` databases visible to every caller.
        let conn = db.connect()?;

        info!("TursoClient initialized");
        Ok(Self {
            inner: Arc::new(db),
            conn,
        })
    }

    pub fn get_connection(&self) -> Connection {
        self.conn.clone()
    }
}

pub fn opt_text(row: &Row, idx: i32) -> Result<Option<String>, StorageError> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(text) => Ok(Some(text)),
        other => Err(StorageError::CorruptRow(format!(
            "expected text in column {}, got {:?}",
            idx, other
        ))),
    }
}

pub fn text_or_null(value: Option<&str>) -> Value {
    match value {
        Some(text) => Value::Text(text.to_string()),
        None => Value::Null,
    }
}
