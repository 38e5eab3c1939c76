//! Schema migrations for the thread table

use rusqlite::{Connection, OptionalExtension, Result};
use tracing::{error, info, warn};

use crate::thread_db::schema::DatabaseStats;

/// Applies the numbered migration scripts in order
pub struct MigrationManager<'a> {
    conn: &'a mut Connection,
}

impl<'a> MigrationManager<'a> {
    pub fn new(conn: &'a mut Connection) -> Self {
        Self { conn }
    }

    /// Bring the schema up to the latest version
    pub fn initialize_database(&mut self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        let current_version = self.get_current_version()?;
        info!("Current thread index schema version: {}", current_version);

        self.apply_migrations(current_version)
    }

    fn apply_migrations(&mut self, current_version: i32) -> Result<()> {
        for (version, migration_sql) in get_migrations() {
            if version <= current_version {
                continue;
            }
            info!("Applying migration {}...", version);

            let tx = self.conn.transaction()?;
            if let Err(e) = tx.execute_batch(migration_sql) {
                error!("Failed to apply migration {}: {}", version, e);
                return Err(e);
            }
            tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
            tx.commit()?;

            info!("Migration {} applied successfully", version);
        }
        Ok(())
    }

    pub fn get_current_version(&self) -> Result<i32> {
        self.conn.query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
    }

    pub fn has_migration_applied(&self, version: i32) -> Result<bool> {
        self.conn
            .query_row(
                "SELECT 1 FROM schema_version WHERE version = ?1",
                [version],
                |_| Ok(1),
            )
            .optional()
            .map(|result| result.is_some())
    }
}

fn get_migrations() -> Vec<(i32, &'static str)> {
    vec![
        (1, include_str!("migrations/001_initial.sql")),
        (2, include_str!("migrations/002_list_indexes.sql")),
        (3, include_str!("migrations/003_unique_address.sql")),
    ]
}

pub fn latest_version() -> i32 {
    get_migrations().last().map(|(v, _)| *v).unwrap_or(0)
}

/// Read-only statistics over the thread table
pub fn get_database_stats(conn: &Connection) -> Result<DatabaseStats> {
    let (total_threads, archived_threads, total_unread): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*),
                COALESCE(SUM(CASE WHEN archived != 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(unread_count), 0)
         FROM thread",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    let database_size_bytes: i64 = conn
        .query_row(
            "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
            [],
            |row| row.get(0),
        )
        .unwrap_or_else(|e| {
            warn!("Failed to read database size: {}", e);
            0
        });

    Ok(DatabaseStats {
        total_threads,
        archived_threads,
        total_unread,
        database_size_bytes,
    })
}

/// Run database maintenance tasks
pub fn run_maintenance(conn: &Connection) -> Result<()> {
    info!("Running thread index maintenance...");
    conn.execute_batch("ANALYZE")?;
    conn.execute_batch("PRAGMA incremental_vacuum(100)")?;

    let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
    if integrity != "ok" {
        warn!("Integrity check reported: {}", integrity);
    }
    info!("Thread index maintenance completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_once() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();

        let manager = MigrationManager::new(&mut conn);
        assert_eq!(manager.get_current_version().unwrap(), latest_version());
        assert!(manager.has_migration_applied(1).unwrap());
        assert!(manager.has_migration_applied(3).unwrap());
        assert!(!manager.has_migration_applied(99).unwrap());
    }

    #[test]
    fn test_address_is_unique() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();

        conn.execute("INSERT INTO thread (address) VALUES ('a')", []).unwrap();
        let err = conn
            .execute("INSERT INTO thread (address) VALUES ('a')", [])
            .unwrap_err();
        assert!(crate::error::IndexError::is_unique_violation(&err));
    }

    #[test]
    fn test_stats_on_empty_table() {
        let mut conn = Connection::open_in_memory().unwrap();
        MigrationManager::new(&mut conn).initialize_database().unwrap();

        let stats = get_database_stats(&conn).unwrap();
        assert_eq!(stats.total_threads, 0);
        assert_eq!(stats.archived_threads, 0);
        assert_eq!(stats.total_unread, 0);
    }
}
