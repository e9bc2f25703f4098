//! SQLite implementation of `UserGateway`.
//!
//! One database file holds every participant record, so provisioned
//! users and completed surveys survive a service restart. A
//! `schema_version` table records how far the schema has evolved;
//! changing it means bumping `CURRENT_SCHEMA_VERSION` and adding the
//! matching block to `run_migrations()`, which walks existing databases
//! forward one version at a time.
//!
//! Reads are lenient: a record whose stored group is unrecognized, or
//! whose reactions column fails to decode, comes back with that field
//! absent rather than failing the fetch. The session layer substitutes
//! the default group; the export tool skips such rows.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use super::{GatewayError, UserGateway};
use crate::user::{Group, ReactionCounts, UserId, UserRecord};

/// Schema version this build writes. Bump alongside a new block in
/// `run_migrations()`.
const CURRENT_SCHEMA_VERSION: i64 = 1;

/// SQLite-backed user record store.
///
/// rusqlite is synchronous, so every call hops onto the blocking pool
/// via `tokio::task::spawn_blocking` and serializes on the connection
/// mutex there.
pub struct SqliteGateway {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGateway {
    /// Open (or create) the database at the given path and bring its
    /// schema up to date.
    ///
    /// The connection runs with WAL journaling, `synchronous = FULL`,
    /// and a 5s busy timeout; opening fails outright if WAL cannot
    /// actually be enabled.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GatewayError> {
        let path_ref = path.as_ref();

        // A first run may point at a directory that does not exist yet;
        // :memory: and empty paths have no parent to create.
        let path_str = path_ref.to_string_lossy();
        if path_str != ":memory:" && !path_str.is_empty() {
            if let Some(parent) = path_ref.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        GatewayError::storage(
                            "create database directory",
                            format!("{}: {}", parent.display(), e),
                        )
                    })?;
                }
            }
        }

        let conn = Connection::open(path_ref)
            .map_err(|e| GatewayError::storage("open database", e.to_string()))?;

        // The WAL pragma reports the mode it actually picked, and on
        // filesystems without shared-memory support that can still be the
        // rollback journal, so check the answer rather than trusting the
        // request. An in-memory database answers "memory", which is fine:
        // nothing in it is durable to begin with.
        let is_in_memory = path_str == ":memory:";
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
            .map_err(|e| GatewayError::storage("set journal_mode", e.to_string()))?;

        let journal_mode_ok = journal_mode.eq_ignore_ascii_case("wal")
            || (is_in_memory && journal_mode.eq_ignore_ascii_case("memory"));

        if !journal_mode_ok {
            return Err(GatewayError::storage(
                "configure journal_mode",
                format!(
                    "WAL journaling is required but SQLite reported '{}'; \
                     this filesystem may not support it",
                    journal_mode
                ),
            ));
        }

        conn.execute_batch(
            r#"
            PRAGMA synchronous = FULL;
            PRAGMA busy_timeout = 5000;
            "#,
        )
        .map_err(|e| GatewayError::storage("configure pragmas", e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS schema_version (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                version INTEGER NOT NULL
            );
            "#,
        )
        .map_err(|e| GatewayError::storage("create schema_version table", e.to_string()))?;

        // A fresh database has no version row yet; treat that as 0 so
        // every migration runs.
        let current_version: i64 = conn
            .query_row(
                "SELECT version FROM schema_version WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| GatewayError::storage("get schema version", e.to_string()))?
            .unwrap_or(0);

        Self::run_migrations(&conn, current_version)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Walk the schema forward from `from_version`, one version at a
    /// time. A database written by a newer build is refused rather than
    /// guessed at.
    fn run_migrations(conn: &Connection, from_version: i64) -> Result<(), GatewayError> {
        if from_version > CURRENT_SCHEMA_VERSION {
            return Err(GatewayError::storage(
                "schema version",
                format!(
                    "database is at schema version {} but this build only \
                     knows version {}",
                    from_version, CURRENT_SCHEMA_VERSION
                ),
            ));
        }

        if from_version == CURRENT_SCHEMA_VERSION {
            return Ok(());
        }

        // v1: the users table. "group" is an SQL keyword, so the column
        // is named grp.
        if from_version < 1 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS users (
                    id TEXT PRIMARY KEY,
                    grp TEXT,
                    locked INTEGER NOT NULL DEFAULT 0,
                    reactions TEXT
                );
                "#,
            )
            .map_err(|e| GatewayError::storage("migration v1", e.to_string()))?;
        }

        conn.execute(
            "INSERT OR REPLACE INTO schema_version (id, version) VALUES (1, ?1)",
            params![CURRENT_SCHEMA_VERSION],
        )
        .map_err(|e| GatewayError::storage("update schema version", e.to_string()))?;

        Ok(())
    }

    /// Create a new in-memory SQLite gateway (for testing).
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, GatewayError> {
        Self::new(":memory:")
    }

    /// Run a raw statement against the database (test setup only).
    #[cfg(test)]
    fn execute_raw(&self, sql: &str) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql).unwrap();
    }

    // =========================================================================
    // Bulk maintenance operations
    //
    // These serve the offline admin tooling only; the interactive session
    // path never calls them.
    // =========================================================================

    /// Insert `{group, locked: false}` rows for ids not already present.
    ///
    /// Existing records - locked or not - are left untouched. Returns the
    /// number of rows created.
    pub async fn create_if_absent(
        &self,
        entries: Vec<(UserId, Group)>,
    ) -> Result<usize, GatewayError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn
                .transaction()
                .map_err(|e| GatewayError::storage("create users", e.to_string()))?;

            let mut created = 0;
            {
                let mut stmt = tx
                    .prepare("INSERT OR IGNORE INTO users (id, grp, locked) VALUES (?1, ?2, 0)")
                    .map_err(|e| GatewayError::storage("create users", e.to_string()))?;
                for (id, group) in &entries {
                    created += stmt
                        .execute(params![id.as_str(), group.as_str()])
                        .map_err(|e| GatewayError::storage("create users", e.to_string()))?;
                }
            }

            tx.commit()
                .map_err(|e| GatewayError::storage("create users", e.to_string()))?;
            Ok(created)
        })
        .await
        .map_err(|e| GatewayError::storage("create users", e.to_string()))?
    }

    /// Delete the listed ids, but only rows that are not locked.
    ///
    /// Completed surveys are never deleted this way. Returns the number of
    /// rows removed.
    pub async fn delete_unlocked(&self, ids: Vec<UserId>) -> Result<usize, GatewayError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().unwrap();
            let tx = conn
                .transaction()
                .map_err(|e| GatewayError::storage("delete users", e.to_string()))?;

            let mut deleted = 0;
            {
                let mut stmt = tx
                    .prepare("DELETE FROM users WHERE id = ?1 AND locked = 0")
                    .map_err(|e| GatewayError::storage("delete users", e.to_string()))?;
                for id in &ids {
                    deleted += stmt
                        .execute(params![id.as_str()])
                        .map_err(|e| GatewayError::storage("delete users", e.to_string()))?;
                }
            }

            tx.commit()
                .map_err(|e| GatewayError::storage("delete users", e.to_string()))?;
            Ok(deleted)
        })
        .await
        .map_err(|e| GatewayError::storage("delete users", e.to_string()))?
    }

    /// Every stored record, ordered by id for deterministic output.
    pub async fn export_records(&self) -> Result<Vec<(UserId, UserRecord)>, GatewayError> {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();
            let mut stmt = conn
                .prepare("SELECT id, grp, locked, reactions FROM users ORDER BY id")
                .map_err(|e| GatewayError::storage("export", e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })
                .map_err(|e| GatewayError::storage("export", e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let (id, grp, locked, reactions) =
                    row.map_err(|e| GatewayError::storage("export", e.to_string()))?;
                let record = decode_record(&id, grp, locked, reactions);
                records.push((UserId::from(id), record));
            }
            Ok(records)
        })
        .await
        .map_err(|e| GatewayError::storage("export", e.to_string()))?
    }
}

/// Decode one `users` row, tolerating unrecognized or undecodable fields.
fn decode_record(
    id: &str,
    grp: Option<String>,
    locked: bool,
    reactions_json: Option<String>,
) -> UserRecord {
    let group = grp.as_deref().and_then(|s| {
        let parsed = Group::parse(s);
        if parsed.is_none() {
            warn!("Unrecognized group '{}' on record {}, treating as absent", s, id);
        }
        parsed
    });

    let reactions = reactions_json
        .as_deref()
        .and_then(|json| match serde_json::from_str::<ReactionCounts>(json) {
            Ok(counts) => Some(counts),
            Err(e) => {
                warn!("Undecodable reactions on record {}: {}", id, e);
                None
            }
        });

    UserRecord {
        group,
        locked,
        reactions,
    }
}

#[async_trait]
impl UserGateway for SqliteGateway {
    async fn fetch_by_id(&self, id: &UserId) -> Result<Option<UserRecord>, GatewayError> {
        let conn = self.conn.clone();
        let id = id.clone();

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            let row: Option<(Option<String>, bool, Option<String>)> = conn
                .query_row(
                    "SELECT grp, locked, reactions FROM users WHERE id = ?1",
                    params![id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()
                .map_err(|e| GatewayError::storage("fetch", e.to_string()))?;

            Ok(row.map(|(grp, locked, reactions)| decode_record(id.as_str(), grp, locked, reactions)))
        })
        .await
        .map_err(|e| GatewayError::storage("fetch", e.to_string()))?
    }

    async fn write_by_id(&self, id: &UserId, record: UserRecord) -> Result<(), GatewayError> {
        let conn = self.conn.clone();
        let id = id.clone();

        let reactions_json = match &record.reactions {
            Some(counts) => Some(
                serde_json::to_string(counts)
                    .map_err(|e| GatewayError::storage("serialize reactions", e.to_string()))?,
            ),
            None => None,
        };

        tokio::task::spawn_blocking(move || {
            let conn = conn.lock().unwrap();

            conn.execute(
                "INSERT OR REPLACE INTO users (id, grp, locked, reactions)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    id.as_str(),
                    record.group.map(|g| g.as_str()),
                    record.locked,
                    reactions_json,
                ],
            )
            .map_err(|e| GatewayError::storage("write", e.to_string()))?;

            Ok(())
        })
        .await
        .map_err(|e| GatewayError::storage("write", e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_unknown_id_is_none() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        let id = UserId::from("nobody");

        assert_eq!(gateway.fetch_by_id(&id).await.unwrap(), None);
        assert_eq!(gateway.fetch_by_id(&id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_then_fetch_round_trip() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        let id = UserId::from("u1");
        let record = UserRecord::completed(Group::WithMotion, ReactionCounts([3, 0, 1, 7]));

        gateway.write_by_id(&id, record.clone()).await.unwrap();
        assert_eq!(gateway.fetch_by_id(&id).await.unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_write_overwrites_existing_record() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        let id = UserId::from("u1");

        gateway
            .write_by_id(&id, UserRecord::fresh(Group::Plain))
            .await
            .unwrap();
        let completed = UserRecord::completed(Group::Plain, ReactionCounts([0, 0, 0, 0]));
        gateway.write_by_id(&id, completed.clone()).await.unwrap();

        assert_eq!(gateway.fetch_by_id(&id).await.unwrap(), Some(completed));
    }

    #[tokio::test]
    async fn test_unrecognized_group_reads_as_absent() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        gateway.execute_raw("INSERT INTO users (id, grp, locked) VALUES ('odd', 'sparkle', 0)");

        let record = gateway
            .fetch_by_id(&UserId::from("odd"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.group, None);
        assert_eq!(record.effective_group(), Group::Plain);
    }

    #[tokio::test]
    async fn test_undecodable_reactions_read_as_absent() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        gateway.execute_raw(
            "INSERT INTO users (id, grp, locked, reactions) VALUES ('bad', 'plain', 1, 'not json')",
        );

        let record = gateway
            .fetch_by_id(&UserId::from("bad"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.reactions, None);
        assert!(record.locked);
    }

    #[tokio::test]
    async fn test_create_if_absent_skips_existing() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        let existing = UserId::from("taken");
        gateway
            .write_by_id(
                &existing,
                UserRecord::completed(Group::Plain, ReactionCounts([1, 1, 1, 1])),
            )
            .await
            .unwrap();

        let created = gateway
            .create_if_absent(vec![
                (existing.clone(), Group::WithMotion),
                (UserId::from("fresh"), Group::Plain),
            ])
            .await
            .unwrap();
        assert_eq!(created, 1);

        // The completed record was not clobbered.
        let record = gateway.fetch_by_id(&existing).await.unwrap().unwrap();
        assert!(record.locked);
        assert_eq!(record.group, Some(Group::Plain));

        let fresh = gateway
            .fetch_by_id(&UserId::from("fresh"))
            .await
            .unwrap()
            .unwrap();
        assert!(!fresh.locked);
        assert_eq!(fresh.reactions, None);
    }

    #[tokio::test]
    async fn test_delete_unlocked_leaves_locked_rows() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        let locked = UserId::from("done");
        let open = UserId::from("open");
        gateway
            .write_by_id(
                &locked,
                UserRecord::completed(Group::Plain, ReactionCounts([2, 0, 0, 0])),
            )
            .await
            .unwrap();
        gateway
            .write_by_id(&open, UserRecord::fresh(Group::Plain))
            .await
            .unwrap();

        let deleted = gateway
            .delete_unlocked(vec![locked.clone(), open.clone(), UserId::from("ghost")])
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        assert!(gateway.fetch_by_id(&locked).await.unwrap().is_some());
        assert!(gateway.fetch_by_id(&open).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_records_ordered_by_id() {
        let gateway = SqliteGateway::new_in_memory().unwrap();
        for (id, group) in [("b", Group::Plain), ("a", Group::WithMotion), ("c", Group::Plain)] {
            gateway
                .write_by_id(&UserId::from(id), UserRecord::fresh(group))
                .await
                .unwrap();
        }

        let records = gateway.export_records().await.unwrap();
        let ids: Vec<&str> = records.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_reopen_preserves_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("survey.db");
        let id = UserId::from("persist");
        let record = UserRecord::completed(Group::WithMotion, ReactionCounts([0, 5, 0, 2]));

        {
            let gateway = SqliteGateway::new(&path).unwrap();
            gateway.write_by_id(&id, record.clone()).await.unwrap();
        }

        let reopened = SqliteGateway::new(&path).unwrap();
        assert_eq!(reopened.fetch_by_id(&id).await.unwrap(), Some(record));
    }
}
