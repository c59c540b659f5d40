//! Flat records handed over by the database library.
//!
//! Groups arrive in pre-order with an explicit nesting level; entries point
//! at their group by id.

use crate::secret::SecretString;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A group record as produced by the database library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Stable group id, referenced by entries
    pub id: u32,
    /// Nesting level, 0 = top level
    pub level: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl GroupRecord {
    pub fn new(id: u32, level: u32, name: impl Into<String>) -> Self {
        Self {
            id,
            level,
            name: name.into(),
            modified: None,
        }
    }
}

/// An entry record as produced by the database library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryRecord {
    /// Id of the group this entry belongs to
    pub group_id: u32,
    pub title: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: SecretString,
    #[serde(default)]
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<DateTime<Utc>>,
}

impl EntryRecord {
    pub fn new(group_id: u32, title: impl Into<String>) -> Self {
        Self {
            group_id,
            title: title.into(),
            username: String::new(),
            password: SecretString::default(),
            url: String::new(),
            modified: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    pub fn with_password(mut self, password: impl Into<SecretString>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

/// The complete decrypted content of one database file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordStream {
    /// Groups in pre-order
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    /// Entries in source order
    #[serde(default)]
    pub entries: Vec<EntryRecord>,
}

impl RecordStream {
    pub fn new(groups: Vec<GroupRecord>, entries: Vec<EntryRecord>) -> Self {
        Self { groups, entries }
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.entries.is_empty()
    }
}
