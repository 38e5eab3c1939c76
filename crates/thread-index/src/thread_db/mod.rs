//! Thread database module - SQLite-backed conversation thread index
pub mod directory;
pub mod message_store;
pub mod migration;
pub mod reader;
pub mod schema;
pub mod thread_store;

pub use directory::{Directory, InMemoryDirectory, SqliteDirectory};
pub use message_store::{MessageSource, NewMessage, SqliteMessageStore};
pub use migration::MigrationManager;
pub use reader::{ThreadCursor, ThreadFilter, ThreadReader};
pub use schema::*;
pub use thread_store::ThreadIndex;

use crate::config::IndexConfig;
use crate::error::Result;
use crate::notifier::{ChangeEvent, ChangeListener, ChangeNotifier, SubscriptionId};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::cell::RefCell;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type SqlitePool = Pool<SqliteConnectionManager>;
pub type SqliteConnection = PooledConnection<SqliteConnectionManager>;

/// A serialized write scope (`BEGIN IMMEDIATE`).
///
/// Change events raised inside the scope are held back and published only
/// after `COMMIT` succeeds. Dropping an unfinished transaction rolls it back
/// and discards its events.
pub struct WriteTransaction {
    conn: SqliteConnection,
    notifier: Arc<ChangeNotifier>,
    pending: RefCell<Vec<ChangeEvent>>,
    finished: bool,
}

impl WriteTransaction {
    pub(crate) fn begin(pool: &SqlitePool, notifier: &Arc<ChangeNotifier>) -> Result<Self> {
        let conn = pool.get()?;
        conn.execute_batch("BEGIN IMMEDIATE TRANSACTION;")?;
        Ok(Self {
            conn,
            notifier: Arc::clone(notifier),
            pending: RefCell::new(Vec::new()),
            finished: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub(crate) fn defer_publish(&self, event: ChangeEvent) {
        self.pending.borrow_mut().push(event);
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn.execute_batch("COMMIT;")?;
        self.finished = true;

        let events = self.pending.take();
        debug!("Write transaction committed with {} change events", events.len());
        for event in events {
            self.notifier.publish(event);
        }
        Ok(())
    }

    pub fn rollback(mut self) -> Result<()> {
        self.finished = true;
        self.pending.borrow_mut().clear();
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }
}

impl Drop for WriteTransaction {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.conn.execute_batch("ROLLBACK;") {
                warn!("Failed to roll back abandoned write transaction: {}", e);
            }
        }
    }
}

/// Owns the connection pool, the change notifier and every component built on them.
pub struct ThreadDatabase {
    pub threads: ThreadIndex,
    pub reader: ThreadReader,
    notifier: Arc<ChangeNotifier>,
    pool: Arc<SqlitePool>,
}

impl ThreadDatabase {
    pub fn open(
        config: &IndexConfig,
        messages: Arc<dyn MessageSource>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self> {
        let db_path = &config.database_path;
        info!("Opening thread index at: {}", db_path.display());
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let manager = SqliteConnectionManager::file(db_path)
            .with_flags(
                rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                    | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                    | rusqlite::OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            )
            .with_init(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                conn.execute_batch("PRAGMA foreign_keys = ON;")
            });
        let pool = Pool::builder().max_size(config.pool_size).build(manager)?;

        {
            let mut conn = pool.get()?;
            conn.execute_batch(
                "PRAGMA auto_vacuum = INCREMENTAL;
                 PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;",
            )?;
            let mut migrator = MigrationManager::new(&mut conn);
            migrator.initialize_database()?;
        }

        let pool = Arc::new(pool);
        let notifier = Arc::new(ChangeNotifier::new());
        info!("Thread index initialized successfully");
        Ok(Self {
            threads: ThreadIndex::new(Arc::clone(&pool), Arc::clone(&notifier), messages),
            reader: ThreadReader::new(Arc::clone(&pool), directory, config.page_size),
            notifier,
            pool,
        })
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.notifier.unsubscribe(id)
    }

    pub fn begin_write(&self) -> Result<WriteTransaction> {
        WriteTransaction::begin(&self.pool, &self.notifier)
    }

    /// Run `f` as one atomic write unit; commit on `Ok`, roll back on `Err`.
    pub fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&WriteTransaction) -> Result<T>,
    {
        let tx = self.begin_write()?;
        match f(&tx) {
            Ok(result) => {
                tx.commit()?;
                Ok(result)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!("Rollback after failed write also failed: {}", rollback_err);
                }
                Err(e)
            }
        }
    }

    /// Scoped access to a pooled connection outside any write transaction.
    pub fn with_connection<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.pool.get()?;
        f(&conn)
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        let conn = self.pool.get()?;
        Ok(migration::get_database_stats(&conn)?)
    }

    pub fn maintain(&self) -> Result<()> {
        let conn = self.pool.get()?;
        Ok(migration::run_maintenance(&conn)?)
    }
}

impl Drop for ThreadDatabase {
    fn drop(&mut self) {
        self.notifier.clear();
        if let Ok(conn) = self.pool.get() {
            let _ = conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);");
        }
    }
}
