//! Voice state actions as the single source of truth for action strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What a user did to their voice presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityAction {
    /// Connected to a voice channel from no channel. Opens a transaction.
    Joined,
    /// Moved between voice channels without disconnecting.
    Switched,
    /// Disconnected from voice. Closes a transaction.
    Left,
}

impl ActivityAction {
    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Joined => "joined",
            Self::Switched => "switched",
            Self::Left => "left",
        }
    }

    /// Integer encoding used by the activity API.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Joined => 0,
            Self::Switched => 1,
            Self::Left => 2,
        }
    }

    /// Decodes the activity API's integer encoding.
    pub fn from_code(code: u64) -> Result<Self, UnknownAction> {
        match code {
            0 => Ok(Self::Joined),
            1 => Ok(Self::Switched),
            2 => Ok(Self::Left),
            _ => Err(UnknownAction(code.to_string())),
        }
    }
}

impl fmt::Display for ActivityAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ActivityAction {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "joined" | "Joined" => Ok(Self::Joined),
            "switched" | "Switched" => Ok(Self::Switched),
            "left" | "Left" => Ok(Self::Left),
            _ => Err(UnknownAction(s.to_string())),
        }
    }
}

impl Serialize for ActivityAction {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActivityAction {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_any(ActionVisitor)
    }
}

struct ActionVisitor;

impl serde::de::Visitor<'_> for ActionVisitor {
    type Value = ActivityAction;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an action name or integer code")
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Self::Value, E> {
        ActivityAction::from_code(v).map_err(E::custom)
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Self::Value, E> {
        let code = u64::try_from(v).map_err(|_| E::custom(UnknownAction(v.to_string())))?;
        self.visit_u64(code)
    }
}

/// Error type for unknown action strings or codes.
#[derive(Debug, Clone)]
pub struct UnknownAction(String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown activity action: {}", self.0)
    }
}

impl std::error::Error for UnknownAction {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_parses_back() {
        for action in [
            ActivityAction::Joined,
            ActivityAction::Switched,
            ActivityAction::Left,
        ] {
            let parsed: ActivityAction = action.to_string().parse().expect("should parse");
            assert_eq!(parsed, action);
        }
    }

    #[test]
    fn api_names_and_codes_deserialize() {
        let from_name: ActivityAction = serde_json::from_str(r#""Switched""#).unwrap();
        assert_eq!(from_name, ActivityAction::Switched);

        let from_code: ActivityAction = serde_json::from_str("2").unwrap();
        assert_eq!(from_code, ActivityAction::Left);
    }

    #[test]
    fn unknown_action_errors() {
        assert!("kicked".parse::<ActivityAction>().is_err());
        assert!(serde_json::from_str::<ActivityAction>("7").is_err());

        let err = "kicked".parse::<ActivityAction>().unwrap_err();
        assert_eq!(err.to_string(), "unknown activity action: kicked");
    }

    #[test]
    fn serializes_as_lowercase_name() {
        let json = serde_json::to_string(&ActivityAction::Joined).unwrap();
        assert_eq!(json, r#""joined""#);
    }
}
