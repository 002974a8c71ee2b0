//! SQLite-backed persistence.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};

use super::{Persistence, PersistenceError};
use crate::canvas::{CanvasMetadata, Colour};
use crate::pipeline::ArtifactKind;

fn db_err(e: rusqlite::Error) -> PersistenceError {
    PersistenceError::Database(e.to_string())
}

/// SQLite-backed persistence, serialised behind a mutex.
pub struct SqlitePersistence {
    conn: Mutex<Connection>,
}

impl SqlitePersistence {
    /// Open the database file, creating it and its tables if needed.
    pub fn new(path: &Path) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), PersistenceError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            CREATE TABLE IF NOT EXISTS instances (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                repo_url TEXT NOT NULL,
                game_server_url TEXT NOT NULL,
                UNIQUE (repo_url, game_server_url)
            );

            CREATE TABLE IF NOT EXISTS commits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                instance_id INTEGER NOT NULL REFERENCES instances(id),
                hash TEXT NOT NULL,
                date INTEGER NOT NULL,
                UNIQUE (instance_id, hash)
            );

            CREATE TABLE IF NOT EXISTS saves (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                commit_id INTEGER NOT NULL REFERENCES commits(id),
                kind INTEGER NOT NULL,
                save_path TEXT NOT NULL,
                saved_at TEXT NOT NULL,
                UNIQUE (commit_id, kind)
            );

            CREATE TABLE IF NOT EXISTS palettes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                hash TEXT NOT NULL UNIQUE,
                size INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS palette_colours (
                palette_id INTEGER NOT NULL REFERENCES palettes(id),
                idx INTEGER NOT NULL,
                value INTEGER NOT NULL,
                PRIMARY KEY (palette_id, idx)
            );

            CREATE TABLE IF NOT EXISTS canvas_metadatas (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                palette_id INTEGER NOT NULL REFERENCES palettes(id),
                width INTEGER NOT NULL,
                height INTEGER NOT NULL,
                first_seen_commit_id INTEGER NOT NULL REFERENCES commits(id),
                UNIQUE (palette_id, width, height)
            );

            CREATE TABLE IF NOT EXISTS commit_canvas_metadatas (
                commit_id INTEGER NOT NULL REFERENCES commits(id),
                canvas_metadata_id INTEGER NOT NULL REFERENCES canvas_metadatas(id),
                PRIMARY KEY (commit_id, canvas_metadata_id)
            );

            CREATE INDEX IF NOT EXISTS idx_commits_date ON commits(date);
            CREATE INDEX IF NOT EXISTS idx_saves_commit ON saves(commit_id);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, PersistenceError> {
        self.conn.lock().map_err(|_| PersistenceError::LockPoisoned)
    }

    /// Where an artifact was saved, if it was.
    pub fn artifact_path(
        &self,
        commit_id: i64,
        kind: ArtifactKind,
    ) -> Result<Option<PathBuf>, PersistenceError> {
        let conn = self.lock()?;
        let path: Option<String> = conn
            .query_row(
                "SELECT save_path FROM saves WHERE commit_id = ?1 AND kind = ?2",
                params![commit_id, kind.code()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(path.map(PathBuf::from))
    }

    /// Number of artifacts saved across all commits.
    pub fn count_artifacts(&self) -> Result<i64, PersistenceError> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM saves", [], |row| row.get(0))
            .map_err(db_err)
    }

    /// Canvas metadata linked to a commit.
    pub fn canvas_metadata(
        &self,
        commit_id: i64,
    ) -> Result<Option<CanvasMetadata>, PersistenceError> {
        let conn = self.lock()?;
        let row: Option<(i64, u32, u32)> = conn
            .query_row(
                r#"
                SELECT m.palette_id, m.width, m.height
                FROM canvas_metadatas m
                JOIN commit_canvas_metadatas c ON c.canvas_metadata_id = m.id
                WHERE c.commit_id = ?1
                "#,
                params![commit_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()
            .map_err(db_err)?;

        let Some((palette_id, width, height)) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare("SELECT value FROM palette_colours WHERE palette_id = ?1 ORDER BY idx")
            .map_err(db_err)?;
        let palette = stmt
            .query_map(params![palette_id], |row| row.get::<_, u32>(0))
            .map_err(db_err)?
            .map(|value| value.map(Colour::from_packed))
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(Some(CanvasMetadata::new(width, height, palette)))
    }

    fn palette_hash(metadata: &CanvasMetadata) -> String {
        let mut hasher = Sha256::new();
        for colour in &metadata.palette {
            hasher.update(colour.to_packed().to_be_bytes());
        }
        format!("{:x}", hasher.finalize())
    }
}

impl Persistence for SqlitePersistence {
    fn find_or_create_instance(
        &self,
        repo_url: &str,
        game_server_url: &str,
    ) -> Result<i64, PersistenceError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO instances (repo_url, game_server_url) VALUES (?1, ?2)",
            params![repo_url, game_server_url],
        )
        .map_err(db_err)?;
        conn.query_row(
            "SELECT id FROM instances WHERE repo_url = ?1 AND game_server_url = ?2",
            params![repo_url, game_server_url],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn register_commit(
        &self,
        instance_id: i64,
        hash: &str,
        date: DateTime<Utc>,
    ) -> Result<i64, PersistenceError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR IGNORE INTO commits (instance_id, hash, date) VALUES (?1, ?2, ?3)",
            params![instance_id, hash, date.timestamp()],
        )
        .map_err(db_err)?;
        conn.query_row(
            "SELECT id FROM commits WHERE instance_id = ?1 AND hash = ?2",
            params![instance_id, hash],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn artifact_exists(
        &self,
        commit_id: i64,
        kind: ArtifactKind,
    ) -> Result<bool, PersistenceError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM saves WHERE commit_id = ?1 AND kind = ?2)",
            params![commit_id, kind.code()],
            |row| row.get(0),
        )
        .map_err(db_err)
    }

    fn record_artifact(
        &self,
        commit_id: i64,
        kind: ArtifactKind,
        path: &Path,
    ) -> Result<bool, PersistenceError> {
        let conn = self.lock()?;
        let inserted = conn
            .execute(
                r#"
                INSERT OR IGNORE INTO saves (commit_id, kind, save_path, saved_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![
                    commit_id,
                    kind.code(),
                    path.to_string_lossy().into_owned(),
                    Utc::now().to_rfc3339()
                ],
            )
            .map_err(db_err)?;
        Ok(inserted > 0)
    }

    fn record_canvas_metadata(
        &self,
        commit_id: i64,
        metadata: &CanvasMetadata,
    ) -> Result<(), PersistenceError> {
        let palette_hash = Self::palette_hash(metadata);
        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(db_err)?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM palettes WHERE hash = ?1",
                params![palette_hash],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;

        let palette_id = match existing {
            Some(id) => id,
            None => {
                tx.execute(
                    "INSERT INTO palettes (hash, size) VALUES (?1, ?2)",
                    params![palette_hash, metadata.palette.len() as i64],
                )
                .map_err(db_err)?;
                let id = tx.last_insert_rowid();
                for (idx, colour) in metadata.palette.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO palette_colours (palette_id, idx, value) VALUES (?1, ?2, ?3)",
                        params![id, idx as i64, colour.to_packed()],
                    )
                    .map_err(db_err)?;
                }
                id
            }
        };

        tx.execute(
            r#"
            INSERT OR IGNORE INTO canvas_metadatas (palette_id, width, height, first_seen_commit_id)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![palette_id, metadata.width, metadata.height, commit_id],
        )
        .map_err(db_err)?;
        let metadata_id: i64 = tx
            .query_row(
                "SELECT id FROM canvas_metadatas WHERE palette_id = ?1 AND width = ?2 AND height = ?3",
                params![palette_id, metadata.width, metadata.height],
                |row| row.get(0),
            )
            .map_err(db_err)?;

        tx.execute(
            "INSERT OR IGNORE INTO commit_canvas_metadatas (commit_id, canvas_metadata_id) VALUES (?1, ?2)",
            params![commit_id, metadata_id],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)
    }
}
