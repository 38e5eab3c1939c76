//! Conversation-list reader: filtered, keyset-paged cursor over thread rows
//! joined with directory identities at read time.

use crate::error::{IndexError, Result};
use crate::thread_db::directory::Directory;
use crate::thread_db::schema::{DistributionType, ThreadRecord, ThreadSummary};
use crate::thread_db::thread_store::{row_to_summary, THREAD_COLUMNS};
use crate::thread_db::{SqliteConnection, SqlitePool};
use rusqlite::types::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which thread rows a cursor visits. Compiled into the `WHERE` clause.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadFilter {
    /// Only rows with `message_count != 0`.
    pub non_empty: bool,
    pub archived: Option<bool>,
    pub distribution_types: Option<Vec<DistributionType>>,
}

impl ThreadFilter {
    /// Every row, including empty threads and pseudo rows.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn inbox() -> Self {
        Self {
            non_empty: true,
            archived: Some(false),
            distribution_types: None,
        }
    }

    pub fn archived() -> Self {
        Self {
            non_empty: true,
            archived: Some(true),
            distribution_types: None,
        }
    }

    /// Share targets: any conversation that has messages.
    pub fn direct_share() -> Self {
        Self {
            non_empty: true,
            archived: None,
            distribution_types: None,
        }
    }

    pub fn with_distribution_types(mut self, types: Vec<DistributionType>) -> Self {
        self.distribution_types = Some(types);
        self
    }

    fn compile(&self) -> (Vec<String>, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if self.non_empty {
            conditions.push("message_count != 0".to_string());
        }
        if let Some(archived) = self.archived {
            conditions.push("archived = ?".to_string());
            params.push(Value::Integer(archived as i64));
        }
        if let Some(types) = &self.distribution_types {
            let mut codes: Vec<i64> = types.iter().map(|t| t.as_i64()).collect();
            // legacy rows may still carry 0 for a plain conversation
            if types.contains(&DistributionType::Default) {
                codes.push(0);
            }
            codes.sort_unstable();
            codes.dedup();

            if codes.is_empty() {
                conditions.push("0".to_string());
            } else {
                let placeholders = vec!["?"; codes.len()].join(", ");
                conditions.push(format!("type IN ({})", placeholders));
                params.extend(codes.into_iter().map(Value::Integer));
            }
        }
        (conditions, params)
    }
}

pub struct ThreadReader {
    pool: Arc<SqlitePool>,
    directory: Arc<dyn Directory>,
    page_size: usize,
}

impl ThreadReader {
    pub fn new(pool: Arc<SqlitePool>, directory: Arc<dyn Directory>, page_size: usize) -> Self {
        Self {
            pool,
            directory,
            page_size: page_size.max(1),
        }
    }

    /// Open a cursor over matching threads, newest first. `limit` caps the
    /// number of records yielded.
    pub fn open(&self, filter: &ThreadFilter, limit: Option<usize>) -> Result<ThreadCursor> {
        let conn = self.pool.get()?;
        // one WAL snapshot for every page; ended in `release`
        conn.execute_batch("BEGIN DEFERRED TRANSACTION;")?;
        let (conditions, params) = filter.compile();
        debug!("Opened thread cursor ({} conditions, limit {:?})", conditions.len(), limit);

        Ok(ThreadCursor {
            conn: Some(conn),
            directory: Arc::clone(&self.directory),
            conditions,
            params,
            page_size: self.page_size,
            remaining: limit,
            last_key: None,
            buffer: VecDeque::new(),
            exhausted: false,
        })
    }
}

/// Forward-only cursor. Holds a pooled connection, and a read transaction
/// on it, until it is closed, dropped, exhausted or fails. Writes committed
/// after the first page are not visible to later pages.
pub struct ThreadCursor {
    conn: Option<SqliteConnection>,
    directory: Arc<dyn Directory>,
    conditions: Vec<String>,
    params: Vec<Value>,
    page_size: usize,
    remaining: Option<usize>,
    last_key: Option<(i64, i64)>,
    buffer: VecDeque<ThreadSummary>,
    exhausted: bool,
}

impl ThreadCursor {
    fn fetch_page(&mut self) -> Result<()> {
        let Some(conn) = self.conn.as_ref() else {
            self.exhausted = true;
            return Ok(());
        };

        let mut conditions = self.conditions.clone();
        let mut params = self.params.clone();
        if let Some((date, id)) = self.last_key {
            conditions.push("(date < ? OR (date = ? AND _id < ?))".to_string());
            params.extend([Value::Integer(date), Value::Integer(date), Value::Integer(id)]);
        }

        let page = match self.remaining {
            Some(remaining) => remaining.min(self.page_size),
            None => self.page_size,
        };
        params.push(Value::Integer(page as i64));

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let sql = format!(
            "SELECT {} FROM thread {} ORDER BY date DESC, _id DESC LIMIT ?",
            THREAD_COLUMNS, where_clause
        );

        let mut stmt = conn.prepare_cached(&sql)?;
        let mut rows = stmt.query(rusqlite::params_from_iter(params))?;
        let mut fetched = 0;
        while let Some(row) = rows.next()? {
            let summary = row_to_summary(row)?;
            self.last_key = Some((summary.last_date, summary.thread_id));
            self.buffer.push_back(summary);
            fetched += 1;
        }

        if fetched < page {
            self.exhausted = true;
        }
        Ok(())
    }

    /// The next record, or `None` once the cursor is finished.
    pub fn next_record(&mut self) -> Result<Option<ThreadRecord>> {
        if self.remaining == Some(0) {
            self.release();
            return Ok(None);
        }

        if self.buffer.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.release();
                return Err(e);
            }
        }

        let Some(summary) = self.buffer.pop_front() else {
            self.release();
            return Ok(None);
        };

        let resolved = match self.conn.as_ref() {
            Some(conn) if !summary.distribution_type.is_pseudo() => {
                self.directory.resolve(conn, &summary.address)
            }
            _ => Ok(None),
        };
        let identity = match resolved {
            Ok(identity) => identity,
            Err(IndexError::Serialization(e)) => {
                warn!(
                    "Thread {}: unreadable directory entry for {}: {}",
                    summary.thread_id, summary.address, e
                );
                None
            }
            Err(e) => {
                self.release();
                return Err(e);
            }
        };

        if let Some(remaining) = self.remaining.as_mut() {
            *remaining -= 1;
        }
        Ok(Some(ThreadRecord { summary, identity }))
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    /// Release the connection now. Equivalent to dropping the cursor.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        self.buffer.clear();
        self.exhausted = true;
        if let Some(conn) = self.conn.take() {
            if let Err(e) = conn.execute_batch("ROLLBACK;") {
                warn!("Failed to end thread cursor read transaction: {}", e);
            }
            debug!("Thread cursor released its connection");
        }
    }
}

impl Iterator for ThreadCursor {
    type Item = Result<ThreadRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.next_record().transpose()
    }
}

impl Drop for ThreadCursor {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for ThreadCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadCursor")
            .field("open", &self.conn.is_some())
            .field("buffered", &self.buffer.len())
            .field("remaining", &self.remaining)
            .finish()
    }
}

/// Collect a cursor into a vector, closing it on the first error.
pub fn collect_records(cursor: ThreadCursor) -> Result<Vec<ThreadRecord>> {
    cursor.collect::<std::result::Result<Vec<_>, IndexError>>()
}
