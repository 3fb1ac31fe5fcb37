//! Database peer protocol records.

use serde::{Deserialize, Serialize};

/// Replication role reported by a database peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DbRole {
    Leader,
    Replica,
    #[serde(other)]
    Unknown,
}

impl DbRole {
    /// Parse a raw role string. `primary` is accepted as a leader alias.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "leader" | "primary" => Self::Leader,
            "replica" | "standby" => Self::Replica,
            _ => Self::Unknown,
        }
    }
}

/// Replication lag of one replica, as seen from the leader.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicationStat {
    /// Slot name, `keeper_<db uid>`.
    pub name: String,
    /// Bytes behind the leader.
    pub diff: u64,
}

impl ReplicationStat {
    /// The database uid embedded in the slot name.
    #[must_use]
    pub fn db_uid(&self) -> Option<&str> {
        self.name.split('_').nth(1).filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DbSetting {
    pub name: String,
    pub setting: String,
}
