use super::ProgressStore;
use super::database::Database;
use super::models::Window;
use anyhow::Result;
use rusqlite::{OptionalExtension, Row, params};

/// SQLite-backed scan history.
#[derive(Clone)]
pub struct WindowRepository {
    db: Database,
}

impl WindowRepository {
    const INSERT_WINDOW: &'static str =
        "INSERT INTO windows (from_block, to_block, is_success) VALUES (?1, ?2, ?3)";

    const SELECT_LAST_SUCCESSFUL: &'static str = "SELECT from_block, to_block, is_success
         FROM windows WHERE is_success = 1
         ORDER BY to_block DESC, id DESC LIMIT 1";

    const SELECT_RECENT: &'static str = "SELECT from_block, to_block, is_success
         FROM windows ORDER BY id DESC LIMIT ?1";

    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Most recently written windows, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<Window>> {
        let conn = self.db.conn()?;
        let mut stmt = conn.prepare(Self::SELECT_RECENT)?;
        let windows = stmt
            .query_map(params![limit as i64], Self::row_to_window)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(windows)
    }

    fn row_to_window(row: &Row) -> rusqlite::Result<Window> {
        Ok(Window {
            from_block: row.get(0)?,
            to_block: row.get(1)?,
            is_success: row.get(2)?,
        })
    }
}

impl ProgressStore for WindowRepository {
    fn last_successful_window(&self) -> Result<Option<Window>> {
        let conn = self.db.conn()?;
        let window = conn
            .query_row(Self::SELECT_LAST_SUCCESSFUL, [], Self::row_to_window)
            .optional()?;
        Ok(window)
    }

    fn record_window(&self, window: &Window) -> Result<()> {
        let conn = self.db.conn()?;
        conn.execute(
            Self::INSERT_WINDOW,
            params![window.from_block, window.to_block, window.is_success],
        )?;
        Ok(())
    }
}
