//! Core identifiers and records read from the event log.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::action::ActivityAction;

/// Generates a UUID-backed ID newtype with common trait implementations.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Wraps an existing UUID.
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Generates a fresh random ID.
            pub fn new_v4() -> Self {
                Self(Uuid::new_v4())
            }

            /// Returns the inner UUID.
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_uuid_id!(
    /// Internal identifier of a tracked user.
    UserId
);

define_uuid_id!(
    /// Identifier of a single raw voice event.
    EventId
);

define_uuid_id!(
    /// Groups the events of one continuous voice presence.
    ///
    /// A `Joined` event starts a new transaction; `Switched` and `Left` events
    /// carry the transaction of the presence they belong to.
    TransactionId
);

define_uuid_id!(
    /// Identifier of a persisted aggregate record.
    AggregateId
);

/// A Discord guild (server) snowflake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(u64);

impl GuildId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for GuildId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl FromStr for GuildId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user known to the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    /// Discord account snowflake.
    #[serde(default)]
    pub discord_id: u64,

    #[serde(default)]
    pub username: String,
}

/// A raw voice state change, as recorded by the gateway listener.
///
/// Events are read-only input to the aggregation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub user_id: UserId,
    pub guild_id: GuildId,
    pub action: ActivityAction,

    /// When the voice state changed (UTC).
    pub created: DateTime<Utc>,

    pub transaction_id: TransactionId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_ids_serialize_transparently() {
        let raw = "6f1b3c1e-2a9a-4c6b-9d59-1f3f2e6a7b10";
        let id: UserId = raw.parse().unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), format!("\"{raw}\""));
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn guild_id_is_a_bare_number() {
        let guild: GuildId = serde_json::from_str("1071234567890123456").unwrap();
        assert_eq!(guild.get(), 1_071_234_567_890_123_456);
        assert_eq!(serde_json::to_string(&guild).unwrap(), "1071234567890123456");
    }

    #[test]
    fn event_deserializes_with_api_action_code() {
        let json = r#"{
            "id": "00000000-0000-0000-0000-000000000001",
            "user_id": "00000000-0000-0000-0000-0000000000aa",
            "guild_id": 42,
            "action": 0,
            "created": "2025-03-01T09:00:00Z",
            "transaction_id": "00000000-0000-0000-0000-0000000000f1"
        }"#;
        let event: Event = serde_json::from_str(json).unwrap();
        assert_eq!(event.action, ActivityAction::Joined);
        assert_eq!(event.guild_id, GuildId::new(42));
    }
}
