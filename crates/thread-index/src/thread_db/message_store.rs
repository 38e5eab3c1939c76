//! Message store contract consumed by the thread index, plus a SQLite
//! implementation that owns its own `message` table.
//!
//! The thread index never reads the message table directly; it only goes
//! through [`MessageSource`], on the connection of the caller's transaction,
//! so that a message write and the paired recompute observe the same state.

use crate::address::Address;
use crate::error::Result;
use crate::thread_db::schema::MessageFacts;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

pub trait MessageSource: Send + Sync {
    /// Number of visible messages for the conversation.
    fn conversation_message_count(&self, conn: &Connection, address: &Address) -> Result<i64>;

    /// The most recent visible, non-tombstoned message, if any.
    fn conversation_snippet(&self, conn: &Connection, address: &Address) -> Result<Option<MessageFacts>>;
}

/// Parameters for a new message row
#[derive(Debug, Clone)]
pub struct NewMessage<'a> {
    pub address: &'a Address,
    pub timestamp: i64,
    pub body: &'a str,
    pub is_media_message: bool,
    pub is_system_message: bool,
    pub thumbnail_uri: Option<&'a str>,
    pub delivery_status: i64,
    pub message_type: i64,
}

impl<'a> NewMessage<'a> {
    pub fn text(address: &'a Address, timestamp: i64, body: &'a str) -> Self {
        Self {
            address,
            timestamp,
            body,
            is_media_message: false,
            is_system_message: false,
            thumbnail_uri: None,
            delivery_status: 0,
            message_type: 0,
        }
    }
}

pub const MESSAGE_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS message (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    address TEXT NOT NULL,
    timestamp INTEGER NOT NULL,
    body TEXT NOT NULL,
    is_media INTEGER NOT NULL DEFAULT 0,
    is_system INTEGER NOT NULL DEFAULT 0,
    thumbnail_uri TEXT,
    delivery_status INTEGER NOT NULL DEFAULT 0,
    delivery_receipt_count INTEGER NOT NULL DEFAULT 0,
    read_receipt_count INTEGER NOT NULL DEFAULT 0,
    type INTEGER NOT NULL DEFAULT 0,
    tombstoned INTEGER NOT NULL DEFAULT 0
);
CREATE INDEX IF NOT EXISTS message_address_date_index ON message (address, tombstoned, timestamp);
";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteMessageStore;

impl SqliteMessageStore {
    pub fn new() -> Self {
        Self
    }

    pub fn install(conn: &Connection) -> Result<()> {
        conn.execute_batch(MESSAGE_SCHEMA_SQL)?;
        Ok(())
    }

    pub fn insert(&self, conn: &Connection, message: &NewMessage<'_>) -> Result<i64> {
        conn.execute(
            "INSERT INTO message
             (address, timestamp, body, is_media, is_system, thumbnail_uri, delivery_status, type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                message.address,
                message.timestamp,
                message.body,
                message.is_media_message,
                message.is_system_message,
                message.thumbnail_uri,
                message.delivery_status,
                message.message_type,
            ],
        )?;
        let id = conn.last_insert_rowid();
        debug!("Stored message {} for {}", id, message.address);
        Ok(id)
    }

    pub fn update_body(&self, conn: &Connection, message_id: i64, body: &str) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE message SET body = ?1 WHERE id = ?2",
            params![body, message_id],
        )?;
        Ok(changed > 0)
    }

    pub fn update_receipts(
        &self,
        conn: &Connection,
        message_id: i64,
        delivery_receipt_count: i64,
        read_receipt_count: i64,
    ) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE message SET delivery_receipt_count = ?1, read_receipt_count = ?2 WHERE id = ?3",
            params![delivery_receipt_count, read_receipt_count, message_id],
        )?;
        Ok(changed > 0)
    }

    /// Hide a message without removing it. Returns the owning address.
    pub fn tombstone(&self, conn: &Connection, message_id: i64) -> Result<Option<Address>> {
        let address = self.address_of(conn, message_id)?;
        if address.is_some() {
            conn.execute("UPDATE message SET tombstoned = 1 WHERE id = ?1", [message_id])?;
        }
        Ok(address)
    }

    /// Remove a message. Returns the address it belonged to.
    pub fn delete(&self, conn: &Connection, message_id: i64) -> Result<Option<Address>> {
        let address = self.address_of(conn, message_id)?;
        if address.is_some() {
            conn.execute("DELETE FROM message WHERE id = ?1", [message_id])?;
            debug!("Deleted message {}", message_id);
        }
        Ok(address)
    }

    pub fn address_of(&self, conn: &Connection, message_id: i64) -> Result<Option<Address>> {
        Ok(conn
            .query_row("SELECT address FROM message WHERE id = ?1", [message_id], |row| row.get(0))
            .optional()?)
    }

    fn row_to_facts(row: &Row) -> rusqlite::Result<MessageFacts> {
        Ok(MessageFacts {
            timestamp: row.get(0)?,
            rendered_body: row.get(1)?,
            is_media_message: row.get(2)?,
            is_system_message: row.get(3)?,
            thumbnail_uri: row.get(4)?,
            delivery_status: row.get(5)?,
            delivery_receipt_count: row.get(6)?,
            read_receipt_count: row.get(7)?,
            message_type: row.get(8)?,
        })
    }
}

impl MessageSource for SqliteMessageStore {
    fn conversation_message_count(&self, conn: &Connection, address: &Address) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COUNT(*) FROM message WHERE address = ?1 AND tombstoned = 0",
            [address],
            |row| row.get(0),
        )?)
    }

    fn conversation_snippet(&self, conn: &Connection, address: &Address) -> Result<Option<MessageFacts>> {
        Ok(conn
            .query_row(
                "SELECT timestamp, body, is_media, is_system, thumbnail_uri, delivery_status,
                        delivery_receipt_count, read_receipt_count, type
                 FROM message
                 WHERE address = ?1 AND tombstoned = 0
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                [address],
                Self::row_to_facts,
            )
            .optional()?)
    }
}
