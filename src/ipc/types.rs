use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::db;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Default)]
pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
}

impl AppState {
    /// Opens (creating if needed) the workspace database and makes it the
    /// active one. The previous connection is dropped only on success.
    pub fn open_workspace(&mut self, path: PathBuf) -> anyhow::Result<()> {
        let conn = db::open_db(&path)?;
        log::info!("workspace opened: {}", path.to_string_lossy());
        self.workspace = Some(path);
        self.db = Some(conn);
        Ok(())
    }

    /// Drops the active connection so the database file can be replaced.
    pub fn close_db(&mut self) {
        self.db = None;
    }
}
