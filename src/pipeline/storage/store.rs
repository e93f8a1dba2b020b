use crate::error::{PipelineError, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// One connection to the destination database, held for a single stage.
pub struct Store {
    conn: Connection,
    path: PathBuf,
}

impl Store {
    pub fn open(database_url: &str) -> Result<Self> {
        let path = database_path(database_url)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.busy_timeout(Duration::from_secs(30))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }

    /// Number of rows in `table`.
    pub fn count_rows(&self, table: &str) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

/// Resolve a connection string to a database file.
///
/// Accepts `sqlite://path`, `sqlite:path` or a bare path. In-memory databases
/// are refused since every stage opens its own connection.
pub fn database_path(database_url: &str) -> Result<PathBuf> {
    let url = database_url.trim();
    let raw = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if raw.is_empty() {
        return Err(PipelineError::Config("database url has no path".into()));
    }
    if raw == ":memory:" || raw.starts_with("file::memory:") {
        return Err(PipelineError::Config(
            "in-memory databases do not survive between stages".into(),
        ));
    }
    Ok(PathBuf::from(raw))
}
