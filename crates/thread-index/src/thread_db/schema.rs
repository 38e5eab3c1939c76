//! Row types for the thread index and its collaborators
use crate::address::Address;
use crate::error::{IndexError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;

lazy_static! {
    static ref URI_PATTERN: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.\-]*:\S+$").unwrap();
}

/// Structural partition of a thread row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    /// A real conversation. Also known as CONVERSATION.
    #[default]
    Default,
    Archive,
    InboxZero,
}

impl DistributionType {
    pub const CONVERSATION: DistributionType = DistributionType::Default;

    pub fn as_i64(self) -> i64 {
        match self {
            DistributionType::Default => 2,
            DistributionType::Archive => 3,
            DistributionType::InboxZero => 4,
        }
    }

    /// ARCHIVE and INBOX_ZERO rows never resolve to a recipient or group.
    pub fn is_pseudo(self) -> bool {
        !matches!(self, DistributionType::Default)
    }
}

impl TryFrom<i64> for DistributionType {
    type Error = IndexError;

    fn try_from(value: i64) -> Result<Self> {
        match value {
            0 | 2 => Ok(DistributionType::Default),
            3 => Ok(DistributionType::Archive),
            4 => Ok(DistributionType::InboxZero),
            other => Err(IndexError::UnknownDistributionType(other)),
        }
    }
}

/// A validated `scheme:rest` URI pointing at a snippet thumbnail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnippetUri(String);

impl SnippetUri {
    pub fn parse(raw: &str) -> Result<Self> {
        if URI_PATTERN.is_match(raw) {
            Ok(Self(raw.to_string()))
        } else {
            Err(IndexError::MalformedSnippetUri(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.split(':').next().unwrap_or_default()
    }
}

impl fmt::Display for SnippetUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Persisted per-conversation summary. One row per address with messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadSummary {
    pub thread_id: i64,
    pub address: Address,
    /// Epoch milliseconds, truncated to a whole second.
    pub last_date: i64,
    pub message_count: i64,
    pub unread_count: i64,
    pub read: bool,
    pub delivery_receipt_count: i64,
    pub read_receipt_count: i64,
    pub snippet: Option<String>,
    pub snippet_type: i64,
    pub snippet_uri: Option<SnippetUri>,
    pub distribution_type: DistributionType,
    pub archived: bool,
    pub status: i64,
    pub expires_in: i64,
    pub last_seen: i64,
}

/// Display identity of a peer or group as resolved by the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub display_name: String,
    pub avatar_ref: Option<String>,
    pub is_group: bool,
    #[serde(default)]
    pub members: Vec<Address>,
}

/// A thread summary joined with its resolved identity. Built per read, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadRecord {
    pub summary: ThreadSummary,
    /// Always `None` for ARCHIVE / INBOX_ZERO rows.
    pub identity: Option<Identity>,
}

impl ThreadRecord {
    pub fn thread_id(&self) -> i64 {
        self.summary.thread_id
    }

    pub fn display_name(&self) -> &str {
        self.identity
            .as_ref()
            .map(|i| i.display_name.as_str())
            .unwrap_or_else(|| self.summary.address.as_str())
    }
}

/// Facts the message store reports about a conversation's snippet message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageFacts {
    pub timestamp: i64,
    pub rendered_body: String,
    pub is_media_message: bool,
    pub is_system_message: bool,
    pub thumbnail_uri: Option<String>,
    pub delivery_status: i64,
    pub delivery_receipt_count: i64,
    pub read_receipt_count: i64,
    pub message_type: i64,
}

impl MessageFacts {
    /// Only real media messages with a thumbnail contribute a snippet URI.
    pub fn snippet_uri(&self) -> Option<&str> {
        if !self.is_media_message || self.is_system_message {
            return None;
        }
        self.thumbnail_uri.as_deref()
    }
}

/// Outcome of a recompute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecomputeOutcome {
    Deleted,
    Updated,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStats {
    pub total_threads: i64,
    pub archived_threads: i64,
    pub total_unread: i64,
    pub database_size_bytes: i64,
}

/// Truncate epoch milliseconds to a whole second.
pub fn truncate_to_second(millis: i64) -> i64 {
    millis - millis.rem_euclid(1000)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn media_facts() -> MessageFacts {
        MessageFacts {
            timestamp: 1_000,
            rendered_body: "photo".into(),
            is_media_message: true,
            is_system_message: false,
            thumbnail_uri: Some("content://parts/7/thumb".into()),
            delivery_status: 0,
            delivery_receipt_count: 0,
            read_receipt_count: 0,
            message_type: 1,
        }
    }

    #[test]
    fn test_distribution_type_codes() {
        for dt in [DistributionType::Default, DistributionType::Archive, DistributionType::InboxZero] {
            assert_eq!(DistributionType::try_from(dt.as_i64()).unwrap(), dt);
        }
        assert_eq!(DistributionType::try_from(0).unwrap(), DistributionType::Default);
        assert_eq!(DistributionType::CONVERSATION, DistributionType::Default);
        assert!(matches!(
            DistributionType::try_from(9),
            Err(IndexError::UnknownDistributionType(9))
        ));
    }

    #[test]
    fn test_pseudo_types() {
        assert!(!DistributionType::Default.is_pseudo());
        assert!(DistributionType::Archive.is_pseudo());
        assert!(DistributionType::InboxZero.is_pseudo());
    }

    #[test]
    fn test_snippet_uri_parse() {
        let uri = SnippetUri::parse("content://parts/7/thumb").unwrap();
        assert_eq!(uri.scheme(), "content");
        assert_eq!(uri.as_str(), "content://parts/7/thumb");

        assert!(SnippetUri::parse("").is_err());
        assert!(SnippetUri::parse("no scheme here").is_err());
        assert!(SnippetUri::parse("://missing").is_err());
        assert!(matches!(
            SnippetUri::parse("file:has space"),
            Err(IndexError::MalformedSnippetUri(_))
        ));
    }

    #[test]
    fn test_snippet_uri_policy() {
        let media = media_facts();
        assert_eq!(media.snippet_uri(), Some("content://parts/7/thumb"));

        let system = MessageFacts { is_system_message: true, ..media_facts() };
        assert_eq!(system.snippet_uri(), None);

        let text = MessageFacts { is_media_message: false, ..media_facts() };
        assert_eq!(text.snippet_uri(), None);

        let no_thumb = MessageFacts { thumbnail_uri: None, ..media_facts() };
        assert_eq!(no_thumb.snippet_uri(), None);
    }

    #[test]
    fn test_truncate_to_second() {
        assert_eq!(truncate_to_second(1_000), 1_000);
        assert_eq!(truncate_to_second(1_999), 1_000);
        assert_eq!(truncate_to_second(0), 0);
        assert_eq!(truncate_to_second(1_700_000_123_456), 1_700_000_123_000);
    }
}
