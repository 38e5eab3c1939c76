//! Thread summary maintenance: lookup-or-create, recompute and metadata updates
use crate::address::Address;
use crate::error::{IndexError, Result};
use crate::notifier::{ChangeEvent, ChangeNotifier};
use crate::thread_db::message_store::MessageSource;
use crate::thread_db::schema::*;
use crate::thread_db::{SqlitePool, WriteTransaction};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) const THREAD_COLUMNS: &str = "_id, address, date, message_count, unread_count, read, \
     delivery_receipt_count, read_receipt_count, snippet, snippet_type, snippet_uri, type, \
     archived, status, expires_in, last_seen";

/// Decode a `THREAD_COLUMNS` row. A malformed snippet URI is dropped with a
/// warning rather than failing the read.
pub(crate) fn row_to_summary(row: &Row) -> Result<ThreadSummary> {
    let thread_id: i64 = row.get(0)?;
    let snippet_uri = row
        .get::<_, Option<String>>(10)?
        .and_then(|raw| match SnippetUri::parse(&raw) {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!("Thread {}: {}, showing text-only snippet", thread_id, e);
                None
            }
        });

    Ok(ThreadSummary {
        thread_id,
        address: row.get(1)?,
        last_date: row.get(2)?,
        message_count: row.get(3)?,
        unread_count: row.get(4)?,
        read: row.get(5)?,
        delivery_receipt_count: row.get(6)?,
        read_receipt_count: row.get(7)?,
        snippet: row.get(8)?,
        snippet_type: row.get(9)?,
        snippet_uri,
        distribution_type: DistributionType::try_from(row.get::<_, i64>(11)?)?,
        archived: row.get(12)?,
        status: row.get(13)?,
        expires_in: row.get(14)?,
        last_seen: row.get(15)?,
    })
}

/// Insert an empty thread row. A unique violation on `address` becomes
/// [`IndexError::DuplicateAddress`].
fn insert_thread(
    conn: &Connection,
    address: &Address,
    distribution_type: DistributionType,
) -> Result<i64> {
    let date = truncate_to_second(Utc::now().timestamp_millis());
    let inserted = conn.execute(
        "INSERT INTO thread (date, address, type, message_count) VALUES (?1, ?2, ?3, 0)",
        params![date, address, distribution_type.as_i64()],
    );
    match inserted {
        Ok(_) => Ok(conn.last_insert_rowid()),
        Err(e) if IndexError::is_unique_violation(&e) => {
            Err(IndexError::DuplicateAddress(address.clone()))
        }
        Err(e) => Err(e.into()),
    }
}

/// The only component that creates, updates or deletes thread rows.
pub struct ThreadIndex {
    pool: Arc<SqlitePool>,
    notifier: Arc<ChangeNotifier>,
    messages: Arc<dyn MessageSource>,
}

impl ThreadIndex {
    pub fn new(
        pool: Arc<SqlitePool>,
        notifier: Arc<ChangeNotifier>,
        messages: Arc<dyn MessageSource>,
    ) -> Self {
        Self { pool, notifier, messages }
    }

    fn begin_write(&self) -> Result<WriteTransaction> {
        WriteTransaction::begin(&self.pool, &self.notifier)
    }

    fn lookup(conn: &Connection, address: &Address) -> Result<Option<i64>> {
        Ok(conn
            .query_row("SELECT _id FROM thread WHERE address = ?1", [address], |row| row.get(0))
            .optional()?)
    }

    fn address_for(conn: &Connection, thread_id: i64) -> Result<Option<Address>> {
        Ok(conn
            .query_row("SELECT address FROM thread WHERE _id = ?1", [thread_id], |row| row.get(0))
            .optional()?)
    }

    /// Return the thread for `address`, creating an empty one if none exists.
    ///
    /// Run this and the first message insert inside the same
    /// [`WriteTransaction`] so no second writer can slip in between.
    pub fn get_or_create_thread_id_with_tx(
        &self,
        tx: &WriteTransaction,
        address: &Address,
        distribution_type: DistributionType,
    ) -> Result<i64> {
        let conn = tx.connection();
        if let Some(thread_id) = Self::lookup(conn, address)? {
            return Ok(thread_id);
        }

        let thread_id = insert_thread(conn, address, distribution_type)?;
        debug!("Created thread {} for {}", thread_id, address);
        tx.defer_publish(ChangeEvent::Created(thread_id));
        Ok(thread_id)
    }

    pub fn get_or_create_thread_id(
        &self,
        address: &Address,
        distribution_type: DistributionType,
    ) -> Result<i64> {
        let tx = self.begin_write()?;
        let thread_id = self.get_or_create_thread_id_with_tx(&tx, address, distribution_type)?;
        tx.commit()?;
        Ok(thread_id)
    }

    /// Re-derive the cached summary of `thread_id` from the message store.
    ///
    /// A missing thread is treated as already deleted.
    pub fn recompute_with_tx(
        &self,
        tx: &WriteTransaction,
        thread_id: i64,
        unarchive_on_update: bool,
    ) -> Result<RecomputeOutcome> {
        let conn = tx.connection();
        let Some(address) = Self::address_for(conn, thread_id)? else {
            debug!("Recompute of unknown thread {} is a no-op", thread_id);
            return Ok(RecomputeOutcome::Deleted);
        };

        let count = self.messages.conversation_message_count(conn, &address)?;
        if count == 0 {
            return Self::delete_thread(tx, thread_id);
        }

        let Some(facts) = self.messages.conversation_snippet(conn, &address)? else {
            return Self::delete_thread(tx, thread_id);
        };

        conn.execute(
            "UPDATE thread SET
                date = ?1,
                message_count = ?2,
                snippet = ?3,
                snippet_uri = ?4,
                snippet_type = ?5,
                status = ?6,
                delivery_receipt_count = ?7,
                read_receipt_count = ?8,
                archived = CASE WHEN ?9 THEN 0 ELSE archived END
             WHERE _id = ?10",
            params![
                truncate_to_second(facts.timestamp),
                count,
                &facts.rendered_body,
                facts.snippet_uri(),
                facts.message_type,
                facts.delivery_status,
                facts.delivery_receipt_count,
                facts.read_receipt_count,
                unarchive_on_update,
                thread_id,
            ],
        )?;

        debug!("Recomputed thread {} ({} messages)", thread_id, count);
        tx.defer_publish(ChangeEvent::Updated(thread_id));
        Ok(RecomputeOutcome::Updated)
    }

    pub fn recompute(&self, thread_id: i64, unarchive_on_update: bool) -> Result<RecomputeOutcome> {
        let tx = self.begin_write()?;
        let outcome = self.recompute_with_tx(&tx, thread_id, unarchive_on_update)?;
        tx.commit()?;
        Ok(outcome)
    }

    fn delete_thread(tx: &WriteTransaction, thread_id: i64) -> Result<RecomputeOutcome> {
        tx.connection()
            .execute("DELETE FROM thread WHERE _id = ?1", [thread_id])?;
        info!("Deleted empty thread {}", thread_id);
        tx.defer_publish(ChangeEvent::Deleted(thread_id));
        Ok(RecomputeOutcome::Deleted)
    }

    /// Add `amount` unread messages; call from the transaction that inserted them.
    pub fn increment_unread_with_tx(
        &self,
        tx: &WriteTransaction,
        thread_id: i64,
        amount: u32,
    ) -> Result<()> {
        let changed = tx.connection().execute(
            "UPDATE thread SET unread_count = unread_count + ?1, read = 0 WHERE _id = ?2",
            params![amount, thread_id],
        )?;
        if changed == 0 {
            return Err(IndexError::ThreadNotFound(thread_id));
        }
        tx.defer_publish(ChangeEvent::Updated(thread_id));
        Ok(())
    }

    pub fn mark_read(&self, thread_id: i64) -> Result<()> {
        self.update_one(
            thread_id,
            "UPDATE thread SET unread_count = 0, read = 1 WHERE _id = ?1",
            params![thread_id],
        )
    }

    pub fn set_archived(&self, thread_id: i64, archived: bool) -> Result<()> {
        self.update_one(
            thread_id,
            "UPDATE thread SET archived = ?2 WHERE _id = ?1",
            params![thread_id, archived],
        )
    }

    pub fn set_expires_in(&self, thread_id: i64, expires_in_secs: i64) -> Result<()> {
        self.update_one(
            thread_id,
            "UPDATE thread SET expires_in = ?2 WHERE _id = ?1",
            params![thread_id, expires_in_secs],
        )
    }

    pub fn set_last_seen(&self, thread_id: i64, last_seen_millis: i64) -> Result<()> {
        self.update_one(
            thread_id,
            "UPDATE thread SET last_seen = ?2 WHERE _id = ?1",
            params![thread_id, last_seen_millis],
        )
    }

    fn update_one<P: rusqlite::Params>(&self, thread_id: i64, sql: &str, params: P) -> Result<()> {
        let tx = self.begin_write()?;
        if tx.connection().execute(sql, params)? == 0 {
            return Err(IndexError::ThreadNotFound(thread_id));
        }
        tx.defer_publish(ChangeEvent::Updated(thread_id));
        tx.commit()
    }

    pub fn thread_id_for_with_tx(
        &self,
        tx: &WriteTransaction,
        address: &Address,
    ) -> Result<Option<i64>> {
        Self::lookup(tx.connection(), address)
    }

    /// Lookup only; never creates a row.
    pub fn thread_id_for(&self, address: &Address) -> Result<Option<i64>> {
        let conn = self.pool.get()?;
        Self::lookup(&conn, address)
    }

    pub fn get_summary(&self, thread_id: i64) -> Result<Option<ThreadSummary>> {
        let conn = self.pool.get()?;
        let sql = format!("SELECT {} FROM thread WHERE _id = ?1", THREAD_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query([thread_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(row_to_summary(row)?))
        } else {
            Ok(None)
        }
    }

    /// Archived threads that still hold messages.
    pub fn archived_conversation_count(&self) -> Result<i64> {
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM thread WHERE archived = 1 AND message_count != 0",
            [],
            |row| row.get(0),
        )?)
    }
}
