use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use visiongrab_core::{ProcessingResult, ResultSink};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub prompt: String,
    pub content: String,
    /// Backend label ("Gemini", "Llama", ...) or "Relay Server".
    pub model_name: String,
}

impl HistoryEntry {
    pub fn from_result(result: &ProcessingResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: result.completed_at,
            prompt: result.prompt.clone(),
            content: result.text.clone(),
            model_name: result.label.clone(),
        }
    }
}

/// SQLite-backed history store.
///
/// The connection sits behind a mutex so the store can be shared with the
/// relay server's handler tasks.
pub struct HistoryStore {
    conn: Mutex<Connection>,
    max_entries: Option<u32>,
}

impl HistoryStore {
    /// Open or create the store at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open history database")?;
        let store = Self {
            conn: Mutex::new(conn),
            max_entries: None,
        };
        store.init_schema()?;
        info!(path = %path.display(), "History store opened");
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        let store = Self {
            conn: Mutex::new(conn),
            max_entries: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Keep at most `max` entries; older ones are dropped on insert.
    pub fn with_max_entries(mut self, max: Option<u32>) -> Self {
        self.max_entries = max.filter(|m| *m > 0);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("history store lock poisoned"))
    }

    fn init_schema(&self) -> Result<()> {
        self.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS history (
                id TEXT PRIMARY KEY,
                timestamp TEXT NOT NULL,
                prompt TEXT NOT NULL,
                content TEXT NOT NULL,
                model_name TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_history_timestamp ON history(timestamp);",
        )?;
        Ok(())
    }

    pub fn add_entry(&self, entry: &HistoryEntry) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO history (id, timestamp, prompt, content, model_name)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                entry.id.to_string(),
                format_timestamp(&entry.timestamp),
                entry.prompt,
                entry.content,
                entry.model_name,
            ],
        )?;

        if let Some(max) = self.max_entries {
            let pruned = conn.execute(
                "DELETE FROM history WHERE id NOT IN (
                    SELECT id FROM history ORDER BY timestamp DESC, rowid DESC LIMIT ?1
                )",
                params![max],
            )?;
            if pruned > 0 {
                info!(pruned, max, "Pruned old history entries");
            }
        }
        Ok(())
    }

    /// Newest first. `None` returns everything.
    pub fn list(&self, limit: Option<usize>) -> Result<Vec<HistoryEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, prompt, content, model_name
             FROM history ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
        )?;
        // SQLite treats a negative LIMIT as no limit.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        let entries = stmt
            .query_map(params![limit], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })?
            .filter_map(|r| r.ok())
            .filter_map(|(id, timestamp, prompt, content, model_name)| {
                Some(HistoryEntry {
                    id: Uuid::parse_str(&id).ok()?,
                    timestamp: DateTime::parse_from_rfc3339(&timestamp)
                        .ok()?
                        .with_timezone(&Utc),
                    prompt,
                    content,
                    model_name,
                })
            })
            .collect();

        Ok(entries)
    }

    pub fn get(&self, id: &Uuid) -> Result<Option<HistoryEntry>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT timestamp, prompt, content, model_name FROM history WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((timestamp, prompt, content, model_name)) = row else {
            return Ok(None);
        };
        let timestamp = DateTime::parse_from_rfc3339(&timestamp)
            .context("Corrupt history timestamp")?
            .with_timezone(&Utc);
        Ok(Some(HistoryEntry {
            id: *id,
            timestamp,
            prompt,
            content,
            model_name,
        }))
    }

    /// Returns false if no entry had that id.
    pub fn delete(&self, id: &Uuid) -> Result<bool> {
        let deleted = self
            .lock()?
            .execute("DELETE FROM history WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    /// Overwrite prompt, content and model name of an existing entry.
    pub fn update(&self, entry: &HistoryEntry) -> Result<bool> {
        let updated = self.lock()?.execute(
            "UPDATE history SET prompt = ?2, content = ?3, model_name = ?4 WHERE id = ?1",
            params![
                entry.id.to_string(),
                entry.prompt,
                entry.content,
                entry.model_name
            ],
        )?;
        Ok(updated > 0)
    }

    pub fn count(&self) -> Result<usize> {
        let count: usize = self
            .lock()?
            .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
        Ok(count)
    }
}

/// Fixed-width so text ordering matches time ordering.
fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl ResultSink for HistoryStore {
    fn deliver(&self, result: &ProcessingResult) {
        if let Err(e) = self.add_entry(&HistoryEntry::from_result(result)) {
            warn!(error = %e, label = %result.label, "Failed to record history entry");
        }
    }
}
