//! Conversation thread index: one cached summary row per peer or group,
//! recomputed from the message store after every message mutation and read
//! back through a filtered, paged cursor.

pub mod address;
pub mod config;
pub mod error;
pub mod notifier;
pub mod telemetry;
pub mod thread_db;

// Public API exports
pub use address::Address;
pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use notifier::{ChangeEvent, ChangeListener, ChangeNotifier, SubscriptionId};
pub use thread_db::{
    Directory, DistributionType, Identity, InMemoryDirectory, MessageFacts, MessageSource,
    NewMessage, RecomputeOutcome, SnippetUri, SqliteDirectory, SqliteMessageStore, ThreadCursor,
    ThreadDatabase, ThreadFilter, ThreadIndex, ThreadReader, ThreadRecord, ThreadSummary,
    WriteTransaction,
};
