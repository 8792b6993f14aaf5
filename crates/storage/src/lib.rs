//! Sqlite-backed persistence: the document library, settings and reading state.

use std::path::Path;

use anyhow::Context as _;
use poh_core::{DocumentId, LibraryEntry, LibraryRecord, ReadProgress, Settings};
use rusqlite::{Connection, OptionalExtension as _};
use serde::Serialize;
use serde::de::DeserializeOwned;

const META_LAST_OPENED: &str = "last_opened";
const META_READ_PROGRESS_PREFIX: &str = "read_progress:";

#[derive(Debug)]
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("open sqlite db at {}", path.as_ref().display()))?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory sqlite db")?;
        let storage = Self { conn };
        storage.migrate()?;
        Ok(storage)
    }

    fn migrate(&self) -> anyhow::Result<()> {
        tracing::debug!("migrating library schema");
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                settings_json TEXT NOT NULL
            );
            INSERT OR IGNORE INTO settings (id, settings_json) VALUES (1, '{}');

            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                size INTEGER NOT NULL,
                last_modified INTEGER NOT NULL,
                saved_at INTEGER NOT NULL,
                bytes BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    pub fn load_settings(&self) -> anyhow::Result<Settings> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT settings_json FROM settings WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        let mut settings = match json {
            Some(json) => serde_json::from_str::<Settings>(&json).unwrap_or_else(|err| {
                tracing::warn!("stored settings unreadable, using defaults: {err}");
                Settings::default()
            }),
            None => Settings::default(),
        };
        settings.normalize();
        Ok(settings)
    }

    pub fn save_settings(&self, settings: &Settings) -> anyhow::Result<()> {
        let mut settings = settings.clone();
        settings.normalize();
        let json = serde_json::to_string(&settings)?;
        self.conn.execute(
            "INSERT INTO settings (id, settings_json) VALUES (1, ?)
             ON CONFLICT(id) DO UPDATE SET settings_json = excluded.settings_json",
            [json],
        )?;
        Ok(())
    }

    pub fn put_document(&self, record: &LibraryRecord) -> anyhow::Result<()> {
        let entry = &record.entry;
        self.conn
            .execute(
                r#"
                INSERT INTO documents (id, name, size, last_modified, saved_at, bytes)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    name = excluded.name,
                    size = excluded.size,
                    last_modified = excluded.last_modified,
                    saved_at = excluded.saved_at,
                    bytes = excluded.bytes
                "#,
                (
                    entry.id.as_str(),
                    &entry.name,
                    i64::try_from(entry.size).unwrap_or(i64::MAX),
                    entry.last_modified,
                    entry.saved_at,
                    &record.bytes,
                ),
            )
            .with_context(|| format!("store document {}", entry.id))?;
        Ok(())
    }

    /// Stores the document and marks it as the last opened one.
    pub fn save_document(&self, record: &LibraryRecord) -> anyhow::Result<()> {
        self.put_document(record)?;
        self.set_last_opened(Some(&record.entry.id))
    }

    pub fn get_document(&self, id: &DocumentId) -> anyhow::Result<Option<LibraryRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT id, name, size, last_modified, saved_at, bytes FROM documents WHERE id = ?",
                [id.as_str()],
                |row| {
                    Ok(LibraryRecord {
                        entry: entry_from_row(row)?,
                        bytes: row.get(5)?,
                    })
                },
            )
            .optional()
            .with_context(|| format!("load document {id}"))?;
        Ok(record)
    }

    /// All stored documents, most recently saved first.
    pub fn list_documents(&self) -> anyhow::Result<Vec<LibraryEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, size, last_modified, saved_at FROM documents
             ORDER BY saved_at DESC, rowid DESC",
        )?;
        let rows = stmt.query_map([], entry_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn delete_document(&self, id: &DocumentId) -> anyhow::Result<()> {
        self.conn
            .execute("DELETE FROM documents WHERE id = ?", [id.as_str()])?;
        self.meta_delete(&read_progress_key(id))?;
        if self.last_opened_id()?.as_ref() == Some(id) {
            self.set_last_opened(None)?;
        }
        Ok(())
    }

    pub fn clear_documents(&self) -> anyhow::Result<()> {
        self.conn.execute("DELETE FROM documents", [])?;
        self.conn.execute(
            "DELETE FROM meta WHERE key LIKE ?",
            [format!("{META_READ_PROGRESS_PREFIX}%")],
        )?;
        self.set_last_opened(None)
    }

    pub fn last_opened_id(&self) -> anyhow::Result<Option<DocumentId>> {
        Ok(self
            .meta_get::<String>(META_LAST_OPENED)?
            .filter(|id| !id.is_empty())
            .map(DocumentId))
    }

    pub fn set_last_opened(&self, id: Option<&DocumentId>) -> anyhow::Result<()> {
        let value = id.map(|id| id.as_str()).unwrap_or_default();
        self.meta_put(META_LAST_OPENED, &value)
    }

    pub fn last_opened(&self) -> anyhow::Result<Option<LibraryRecord>> {
        match self.last_opened_id()? {
            Some(id) => self.get_document(&id),
            None => Ok(None),
        }
    }

    pub fn load_read_progress(&self, id: &DocumentId) -> anyhow::Result<Option<ReadProgress>> {
        self.meta_get(&read_progress_key(id))
    }

    pub fn save_read_progress(
        &self,
        id: &DocumentId,
        progress: Option<&ReadProgress>,
    ) -> anyhow::Result<()> {
        match progress {
            Some(progress) => self.meta_put(&read_progress_key(id), progress),
            None => self.meta_delete(&read_progress_key(id)),
        }
    }

    pub fn meta_get<T: DeserializeOwned>(&self, key: &str) -> anyhow::Result<Option<T>> {
        let value: Option<String> = self
            .conn
            .query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match value {
            Some(json) => Ok(Some(
                serde_json::from_str(&json).with_context(|| format!("decode meta {key}"))?,
            )),
            None => Ok(None),
        }
    }

    pub fn meta_put<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> anyhow::Result<()> {
        let json = serde_json::to_string(value)?;
        self.conn.execute(
            "INSERT INTO meta (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, json),
        )?;
        Ok(())
    }

    pub fn meta_delete(&self, key: &str) -> anyhow::Result<()> {
        self.conn.execute("DELETE FROM meta WHERE key = ?", [key])?;
        Ok(())
    }
}

fn read_progress_key(id: &DocumentId) -> String {
    format!("{META_READ_PROGRESS_PREFIX}{id}")
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LibraryEntry> {
    let size: i64 = row.get(2)?;
    Ok(LibraryEntry {
        id: DocumentId(row.get(0)?),
        name: row.get(1)?,
        size: u64::try_from(size).unwrap_or(0),
        last_modified: row.get(3)?,
        saved_at: row.get(4)?,
    })
}
