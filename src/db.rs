use crate::error::{ApiError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

const MIGRATIONS: &[(&str, &str)] = &[(
    "001_create_schema",
    include_str!("../migrations/001_create_schema.sql"),
)];

pub struct DatabaseManager {
    conn: Mutex<Connection>,
}

impl DatabaseManager {
    /// Open (or create) the SQLite file at `path`. `:memory:` opens a private in-memory database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let conn = if path.as_os_str() == ":memory:" {
            Connection::open_in_memory()?
        } else {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let conn = Connection::open(path)?;
            conn.execute_batch("PRAGMA journal_mode=WAL;")?;
            conn
        };
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        info!("Opened database at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self> {
        Self::open(":memory:")
    }

    /// Run the embedded migrations that have not been applied yet.
    pub fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        self.with_connection(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    name       TEXT PRIMARY KEY,
                    applied_at TEXT NOT NULL
                );",
            )?;
            for (name, sql) in MIGRATIONS {
                let applied: bool = conn.query_row(
                    "SELECT EXISTS (SELECT 1 FROM schema_migrations WHERE name = ?1)",
                    [name],
                    |row| row.get(0),
                )?;
                if applied {
                    debug!(migration = name, "already applied");
                    continue;
                }
                let tx = conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
                    rusqlite::params![name, chrono::Utc::now().to_rfc3339()],
                )?;
                tx.commit()?;
                info!(migration = name, "applied");
            }
            Ok(())
        })?;
        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Run `f` with exclusive access to the connection.
    pub fn with_connection<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| ApiError::Internal("database connection lock poisoned".to_string()))?;
        f(&mut conn)
    }

    /// Run `f` on the blocking pool so SQLite I/O never stalls the async workers.
    pub async fn interact<T, F>(self: &Arc<Self>, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = Arc::clone(self);
        tokio::task::spawn_blocking(move || db.with_connection(f))
            .await
            .map_err(|e| ApiError::Internal(format!("database task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ENTITIES;

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .collect::<std::result::Result<_, _>>()
            .unwrap()
    }

    #[test]
    fn migrations_match_entity_definitions() {
        let db = DatabaseManager::in_memory().unwrap();
        db.run_migrations().unwrap();
        db.with_connection(|conn| {
            for entity in ENTITIES {
                let columns = table_columns(conn, entity.table);
                for field in entity.fields {
                    assert!(
                        columns.iter().any(|c| c == field.column),
                        "{}.{} missing",
                        entity.table,
                        field.column
                    );
                }
            }
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sale.db");
        {
            let db = DatabaseManager::open(&path).unwrap();
            db.run_migrations().unwrap();
        }
        let db = DatabaseManager::open(&path).unwrap();
        db.run_migrations().unwrap();
        let count: i64 = db
            .with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn interact_runs_off_the_async_thread() {
        let db = Arc::new(DatabaseManager::in_memory().unwrap());
        let caller = std::thread::current().id();
        let worker = db
            .interact(|_| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(caller, worker);
    }

    #[tokio::test]
    async fn panicking_work_poisons_into_internal_errors() {
        let db = Arc::new(DatabaseManager::in_memory().unwrap());
        let failed = db
            .interact(|_| -> Result<()> { panic!("query blew up") })
            .await;
        assert!(matches!(failed, Err(ApiError::Internal(_))));

        let after = db.with_connection(|_| Ok(()));
        match after {
            Err(ApiError::Internal(msg)) => assert!(msg.contains("poisoned")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
