use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::error::EngineError;

/// Watch marks are kept apart for signed-in and anonymous viewers sharing a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreScope {
    Member,
    Guest,
}

impl StoreScope {
    pub fn from_identity(has_identity: bool) -> Self {
        if has_identity {
            Self::Member
        } else {
            Self::Guest
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Guest => "guest",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchMark {
    pub work_id: String,
    pub last_sequence: u32,
    pub last_timestamp_seconds: u64,
    pub updated_at: String,
}

/// Device-local watch state: resume marks, the discovery watched-set and the
/// mute preference. Every operation is best-effort; failures are logged and
/// reads fall back to empty values.
pub struct WatchStateStore {
    conn: Connection,
    scope: StoreScope,
    persistent: bool,
}

impl WatchStateStore {
    /// Opens the on-disk store, degrading to a session-only in-memory store
    /// when the file is unusable.
    pub fn open(path: &Path, scope: StoreScope) -> Result<Self> {
        match Self::open_file(path) {
            Ok(conn) => Ok(Self {
                conn,
                scope,
                persistent: true,
            }),
            Err(err) => {
                let err = EngineError::StorageUnavailable(format!("{err:#}"));
                warn!(
                    path = %path.display(),
                    error = %err,
                    "keeping watch state in memory for this session"
                );
                Self::in_memory(scope)
            }
        }
    }

    pub fn in_memory(scope: StoreScope) -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory watch store")?;
        migrate(&conn)?;
        Ok(Self {
            conn,
            scope,
            persistent: false,
        })
    }

    fn open_file(path: &Path) -> Result<Connection> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?;
        conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0))
            .context("failed to enable write-ahead log")?;
        migrate(&conn)?;
        Ok(conn)
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    pub fn scope(&self) -> StoreScope {
        self.scope
    }

    pub fn get_watch_mark(&self, work_id: &str) -> Option<WatchMark> {
        let result = self
            .conn
            .query_row(
                r#"
                SELECT work_id, last_sequence, last_timestamp_seconds, updated_at
                FROM watch_marks WHERE scope = ?1 AND work_id = ?2
                "#,
                params![self.scope.as_str(), work_id],
                |row| {
                    Ok(WatchMark {
                        work_id: row.get(0)?,
                        last_sequence: row.get(1)?,
                        last_timestamp_seconds: row.get::<_, i64>(2)?.max(0) as u64,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional();
        match result {
            Ok(mark) => mark,
            Err(err) => {
                warn!(%work_id, %err, "failed to read watch mark");
                None
            }
        }
    }

    /// Last writer wins; a single active playback session serializes calls.
    pub fn set_watch_mark(&self, work_id: &str, sequence: u32, timestamp_seconds: u64) {
        if sequence == 0 {
            warn!(%work_id, "refusing watch mark with sequence 0");
            return;
        }
        let now = Utc::now().to_rfc3339();
        let result = self.conn.execute(
            r#"
            INSERT INTO watch_marks (scope, work_id, last_sequence, last_timestamp_seconds, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(scope, work_id) DO UPDATE SET
                last_sequence = excluded.last_sequence,
                last_timestamp_seconds = excluded.last_timestamp_seconds,
                updated_at = excluded.updated_at
            "#,
            params![
                self.scope.as_str(),
                work_id,
                sequence,
                timestamp_seconds.min(i64::MAX as u64) as i64,
                now
            ],
        );
        if let Err(err) = result {
            warn!(%work_id, sequence, timestamp_seconds, %err, "failed to store watch mark");
        }
    }

    pub fn list_watch_marks(&self) -> Vec<WatchMark> {
        match self.try_list_watch_marks() {
            Ok(marks) => marks,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "failed to list watch marks");
                Vec::new()
            }
        }
    }

    fn try_list_watch_marks(&self) -> Result<Vec<WatchMark>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT work_id, last_sequence, last_timestamp_seconds, updated_at
            FROM watch_marks WHERE scope = ?1 ORDER BY updated_at DESC
            "#,
        )?;
        let rows = stmt.query_map(params![self.scope.as_str()], |row| {
            Ok(WatchMark {
                work_id: row.get(0)?,
                last_sequence: row.get(1)?,
                last_timestamp_seconds: row.get::<_, i64>(2)?.max(0) as u64,
                updated_at: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn mark_watched(&self, item_id: &str) {
        let now = Utc::now().to_rfc3339();
        let result = self.conn.execute(
            "INSERT OR IGNORE INTO watched_items (scope, item_id, watched_at) VALUES (?1, ?2, ?3)",
            params![self.scope.as_str(), item_id, now],
        );
        if let Err(err) = result {
            warn!(%item_id, %err, "failed to record watched item");
        }
    }

    pub fn is_watched(&self, item_id: &str) -> bool {
        let result = self
            .conn
            .query_row(
                "SELECT 1 FROM watched_items WHERE scope = ?1 AND item_id = ?2",
                params![self.scope.as_str(), item_id],
                |_| Ok(()),
            )
            .optional();
        match result {
            Ok(found) => found.is_some(),
            Err(err) => {
                warn!(%item_id, %err, "failed to read watched set");
                false
            }
        }
    }

    pub fn reset_watched(&self) {
        match self.conn.execute(
            "DELETE FROM watched_items WHERE scope = ?1",
            params![self.scope.as_str()],
        ) {
            Ok(removed) => debug!(removed, "watched set cleared"),
            Err(err) => warn!(%err, "failed to clear watched set"),
        }
    }

    /// Defaults to muted.
    pub fn get_mute(&self) -> bool {
        let result = self
            .conn
            .query_row(
                "SELECT value FROM preferences WHERE key = 'muted'",
                [],
                |row| row.get::<_, String>(0),
            )
            .optional();
        match result {
            Ok(Some(value)) => value != "0",
            Ok(None) => true,
            Err(err) => {
                warn!(%err, "failed to read mute preference");
                true
            }
        }
    }

    pub fn set_mute(&self, muted: bool) {
        let result = self.conn.execute(
            r#"
            INSERT INTO preferences (key, value) VALUES ('muted', ?1)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![if muted { "1" } else { "0" }],
        );
        if let Err(err) = result {
            warn!(muted, %err, "failed to store mute preference");
        }
    }

    /// Folds the write-ahead log back into the database file. Called on
    /// teardown so nothing is left only in the WAL when the process exits.
    pub fn flush(&self) {
        if !self.persistent {
            return;
        }
        if let Err(err) = self
            .conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        {
            warn!(%err, "failed to checkpoint watch state");
        }
    }
}

fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS watch_marks (
            scope TEXT NOT NULL,
            work_id TEXT NOT NULL,
            last_sequence INTEGER NOT NULL CHECK (last_sequence >= 1),
            last_timestamp_seconds INTEGER NOT NULL CHECK (last_timestamp_seconds >= 0),
            updated_at TEXT NOT NULL,
            PRIMARY KEY (scope, work_id)
        );
        CREATE INDEX IF NOT EXISTS idx_watch_marks_updated_at ON watch_marks(updated_at DESC);
        CREATE TABLE IF NOT EXISTS watched_items (
            scope TEXT NOT NULL,
            item_id TEXT NOT NULL,
            watched_at TEXT NOT NULL,
            PRIMARY KEY (scope, item_id)
        );
        CREATE TABLE IF NOT EXISTS preferences (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        "#,
    )
    .context("failed to migrate watch state schema")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_db_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "reelstate-db-test-{}-{}",
            std::process::id(),
            name
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir.join("state.db")
    }

    #[test]
    fn watch_mark_round_trip() {
        let store = WatchStateStore::in_memory(StoreScope::Member).expect("store");
        store.set_watch_mark("W1", 3, 47);
        let mark = store.get_watch_mark("W1").expect("mark should exist");
        assert_eq!(mark.last_sequence, 3);
        assert_eq!(mark.last_timestamp_seconds, 47);
        assert!(store.get_watch_mark("W2").is_none());
    }

    #[test]
    fn watch_mark_is_overwritten_by_later_checkpoint() {
        let store = WatchStateStore::in_memory(StoreScope::Member).expect("store");
        store.set_watch_mark("W1", 3, 47);
        store.set_watch_mark("W1", 4, 10);
        let mark = store.get_watch_mark("W1").expect("mark should exist");
        assert_eq!((mark.last_sequence, mark.last_timestamp_seconds), (4, 10));
        assert_eq!(store.list_watch_marks().len(), 1);
    }

    #[test]
    fn watch_marks_are_scoped_by_identity_presence() {
        let path = temp_db_path("scoped");
        {
            let member = WatchStateStore::open(&path, StoreScope::Member).expect("store");
            member.set_watch_mark("W1", 2, 30);
        }
        let guest = WatchStateStore::open(&path, StoreScope::Guest).expect("store");
        assert!(guest.get_watch_mark("W1").is_none());
        let member = WatchStateStore::open(&path, StoreScope::Member).expect("store");
        assert_eq!(
            member.get_watch_mark("W1").map(|mark| mark.last_sequence),
            Some(2)
        );
    }

    #[test]
    fn sequence_zero_is_rejected() {
        let store = WatchStateStore::in_memory(StoreScope::Guest).expect("store");
        store.set_watch_mark("W1", 0, 5);
        assert!(store.get_watch_mark("W1").is_none());
    }

    #[test]
    fn watched_set_marks_and_resets() {
        let store = WatchStateStore::in_memory(StoreScope::Guest).expect("store");
        assert!(!store.is_watched("i-1"));
        store.mark_watched("i-1");
        store.mark_watched("i-1");
        store.mark_watched("i-2");
        assert!(store.is_watched("i-1"));
        assert!(store.is_watched("i-2"));
        store.reset_watched();
        assert!(!store.is_watched("i-1"));
        assert!(!store.is_watched("i-2"));
    }

    #[test]
    fn mute_defaults_to_muted_and_persists() {
        let path = temp_db_path("mute");
        {
            let store = WatchStateStore::open(&path, StoreScope::Guest).expect("store");
            assert!(store.is_persistent());
            assert!(store.get_mute());
            store.set_mute(false);
            store.flush();
        }
        let reopened = WatchStateStore::open(&path, StoreScope::Guest).expect("store");
        assert!(!reopened.get_mute());
    }

    #[test]
    fn unusable_path_degrades_to_memory() {
        let dir = temp_db_path("blocked");
        let parent = dir.parent().expect("parent").to_path_buf();
        std::fs::create_dir_all(parent.parent().expect("grandparent")).expect("mkdir");
        std::fs::write(&parent, b"not a directory").expect("write blocker");

        let store = WatchStateStore::open(&dir, StoreScope::Guest).expect("store");
        assert!(!store.is_persistent());
        store.set_watch_mark("W1", 1, 12);
        assert_eq!(
            store.get_watch_mark("W1").map(|mark| mark.last_timestamp_seconds),
            Some(12)
        );
        let _ = std::fs::remove_file(&parent);
    }
}
