//! Recipient / group directory contract and implementations
use crate::address::Address;
use crate::error::Result;
use crate::thread_db::schema::Identity;
use dashmap::DashMap;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

/// Resolves an address to its display identity.
pub trait Directory: Send + Sync {
    fn resolve(&self, conn: &Connection, address: &Address) -> Result<Option<Identity>>;
}

pub const DIRECTORY_SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS recipient (
    address TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    avatar_ref TEXT
);
CREATE TABLE IF NOT EXISTS group_record (
    group_id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    avatar_ref TEXT,
    members TEXT NOT NULL DEFAULT '[]'
);
";

/// Directory backed by its own `recipient` and `group_record` tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDirectory;

impl SqliteDirectory {
    pub fn new() -> Self {
        Self
    }

    pub fn install(conn: &Connection) -> Result<()> {
        conn.execute_batch(DIRECTORY_SCHEMA_SQL)?;
        Ok(())
    }

    pub fn upsert_recipient(
        &self,
        conn: &Connection,
        address: &Address,
        display_name: &str,
        avatar_ref: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO recipient (address, display_name, avatar_ref) VALUES (?1, ?2, ?3)
             ON CONFLICT(address) DO UPDATE SET display_name = ?2, avatar_ref = ?3",
            params![address, display_name, avatar_ref],
        )?;
        Ok(())
    }

    pub fn upsert_group(
        &self,
        conn: &Connection,
        group_id: &Address,
        title: &str,
        avatar_ref: Option<&str>,
        members: &[Address],
    ) -> Result<()> {
        let members_json = serde_json::to_string(members)?;
        conn.execute(
            "INSERT INTO group_record (group_id, title, avatar_ref, members) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(group_id) DO UPDATE SET title = ?2, avatar_ref = ?3, members = ?4",
            params![group_id, title, avatar_ref, members_json],
        )?;
        Ok(())
    }
}

impl Directory for SqliteDirectory {
    fn resolve(&self, conn: &Connection, address: &Address) -> Result<Option<Identity>> {
        let group: Option<(String, Option<String>, String)> = conn
            .query_row(
                "SELECT title, avatar_ref, members FROM group_record WHERE group_id = ?1",
                [address],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        if let Some((title, avatar_ref, members_json)) = group {
            let members: Vec<Address> = serde_json::from_str(&members_json)?;
            return Ok(Some(Identity {
                display_name: title,
                avatar_ref,
                is_group: true,
                members,
            }));
        }

        Ok(conn
            .query_row(
                "SELECT display_name, avatar_ref FROM recipient WHERE address = ?1",
                [address],
                |row| {
                    Ok(Identity {
                        display_name: row.get(0)?,
                        avatar_ref: row.get(1)?,
                        is_group: false,
                        members: Vec::new(),
                    })
                },
            )
            .optional()?)
    }
}

/// Directory held in memory, for embedders that keep contacts elsewhere.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    entries: Arc<DashMap<Address, Identity>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: Address, identity: Identity) {
        self.entries.insert(address, identity);
    }

    pub fn remove(&self, address: &Address) -> Option<Identity> {
        self.entries.remove(address).map(|(_, identity)| identity)
    }
}

impl Directory for InMemoryDirectory {
    fn resolve(&self, _conn: &Connection, address: &Address) -> Result<Option<Identity>> {
        Ok(self.entries.get(address).map(|entry| entry.value().clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_directory_resolves_recipients_and_groups() {
        let conn = Connection::open_in_memory().unwrap();
        SqliteDirectory::install(&conn).unwrap();
        let directory = SqliteDirectory::new();

        let alice = Address::from("alice@example.com");
        let group = Address::from("__group__!team");
        directory.upsert_recipient(&conn, &alice, "Alice", None).unwrap();
        directory
            .upsert_group(&conn, &group, "Team", Some("avatars/team"), &[alice.clone()])
            .unwrap();

        let identity = directory.resolve(&conn, &alice).unwrap().unwrap();
        assert_eq!(identity.display_name, "Alice");
        assert!(!identity.is_group);

        let identity = directory.resolve(&conn, &group).unwrap().unwrap();
        assert!(identity.is_group);
        assert_eq!(identity.avatar_ref.as_deref(), Some("avatars/team"));
        assert_eq!(identity.members, vec![alice]);

        assert!(directory.resolve(&conn, &Address::from("nobody")).unwrap().is_none());
    }

    #[test]
    fn test_upsert_replaces_identity() {
        let conn = Connection::open_in_memory().unwrap();
        SqliteDirectory::install(&conn).unwrap();
        let directory = SqliteDirectory::new();
        let bob = Address::from("bob");

        directory.upsert_recipient(&conn, &bob, "Bob", None).unwrap();
        directory.upsert_recipient(&conn, &bob, "Robert", Some("avatars/bob")).unwrap();

        let identity = directory.resolve(&conn, &bob).unwrap().unwrap();
        assert_eq!(identity.display_name, "Robert");
        assert_eq!(identity.avatar_ref.as_deref(), Some("avatars/bob"));
    }

    #[test]
    fn test_in_memory_directory() {
        let conn = Connection::open_in_memory().unwrap();
        let directory = InMemoryDirectory::new();
        let carol = Address::from("carol");
        directory.insert(
            carol.clone(),
            Identity {
                display_name: "Carol".into(),
                avatar_ref: None,
                is_group: false,
                members: Vec::new(),
            },
        );

        assert!(directory.resolve(&conn, &carol).unwrap().is_some());
        assert!(directory.remove(&carol).is_some());
        assert!(directory.resolve(&conn, &carol).unwrap().is_none());
    }
}
