//! Wire records of the activity API.
//!
//! The API speaks camelCase JSON with the legacy field names (`timeActiv`,
//! `minutesActiv`, `lastActiv`). Unset identifiers arrive as the nil UUID and
//! unset timestamps as `0001-01-01T00:00:00`, often without an offset.

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;
use vt_core::{
    ActivityAction, AggregateId, Event, EventId, GuildId, MonthBucket, MonthTimeSpent,
    TimeSpent, TransactionId, User, UserId,
};

use crate::ApiError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDto {
    pub id: Uuid,
    #[serde(default)]
    pub discord_id: u64,
    #[serde(default)]
    pub username: Option<String>,
}

impl From<UserDto> for User {
    fn from(dto: UserDto) -> Self {
        Self {
            id: UserId::from_uuid(dto.id),
            discord_id: dto.discord_id,
            username: dto.username.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityDto {
    pub id: Uuid,
    pub user_id: Uuid,
    pub guild_id: u64,
    pub action: ActivityAction,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub created: DateTime<Utc>,
    pub transaction_id: Uuid,
}

impl From<ActivityDto> for Event {
    fn from(dto: ActivityDto) -> Self {
        Self {
            id: EventId::from_uuid(dto.id),
            user_id: UserId::from_uuid(dto.user_id),
            guild_id: GuildId::new(dto.guild_id),
            action: dto.action,
            created: dto.created,
            transaction_id: TransactionId::from_uuid(dto.transaction_id),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSpentDto {
    #[serde(default)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub guild_id: u64,
    #[serde(
        default,
        deserialize_with = "deserialize_optional_timestamp",
        serialize_with = "serialize_optional_timestamp"
    )]
    pub last_activ: Option<DateTime<Utc>>,
    #[serde(default)]
    pub time_activ: Option<String>,
    #[serde(default)]
    pub minutes_activ: i64,
}

impl From<TimeSpentDto> for TimeSpent {
    fn from(dto: TimeSpentDto) -> Self {
        Self {
            id: aggregate_id(dto.id),
            user_id: UserId::from_uuid(dto.user_id),
            guild_id: GuildId::new(dto.guild_id),
            last_active_at: dto.last_activ,
            total_minutes: dto.minutes_activ,
            display: dto.time_activ.unwrap_or_default(),
        }
    }
}

impl From<&TimeSpent> for TimeSpentDto {
    fn from(aggregate: &TimeSpent) -> Self {
        Self {
            id: aggregate.id.map_or(Uuid::nil(), |id| *id.as_uuid()),
            user_id: *aggregate.user_id.as_uuid(),
            guild_id: aggregate.guild_id.get(),
            last_activ: aggregate.last_active_at,
            time_activ: Some(aggregate.display.clone()),
            minutes_activ: aggregate.total_minutes,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTimeSpentDto {
    #[serde(default)]
    pub id: Uuid,
    pub user_id: Uuid,
    pub guild_id: u64,
    pub month_id: i64,
    #[serde(default)]
    pub time_activ: Option<String>,
    #[serde(default)]
    pub minutes_activ: i64,
}

impl TryFrom<MonthTimeSpentDto> for MonthTimeSpent {
    type Error = ApiError;

    fn try_from(dto: MonthTimeSpentDto) -> Result<Self, Self::Error> {
        let month = MonthBucket::try_from(dto.month_id)
            .map_err(|err| ApiError::InvalidResponse(err.to_string()))?;
        Ok(Self {
            id: aggregate_id(dto.id),
            user_id: UserId::from_uuid(dto.user_id),
            guild_id: GuildId::new(dto.guild_id),
            month,
            total_minutes: dto.minutes_activ,
            display: dto.time_activ.unwrap_or_default(),
        })
    }
}

impl From<&MonthTimeSpent> for MonthTimeSpentDto {
    fn from(aggregate: &MonthTimeSpent) -> Self {
        Self {
            id: aggregate.id.map_or(Uuid::nil(), |id| *id.as_uuid()),
            user_id: *aggregate.user_id.as_uuid(),
            guild_id: aggregate.guild_id.get(),
            month_id: aggregate.month.id(),
            time_activ: Some(aggregate.display.clone()),
            minutes_activ: aggregate.total_minutes,
        }
    }
}

fn aggregate_id(id: Uuid) -> Option<AggregateId> {
    (!id.is_nil()).then(|| AggregateId::from_uuid(id))
}

/// Parses RFC 3339, falling back to an offset-less timestamp read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
}

fn deserialize_optional_timestamp<'de, D>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    let parsed = parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))?;
    // DateTime.MinValue stands in for "never"
    Ok((parsed.year() > 1).then_some(parsed))
}

#[allow(clippy::ref_option)]
fn serialize_optional_timestamp<S>(
    value: &Option<DateTime<Utc>>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(at) => {
            serializer.serialize_str(&at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
        }
        None => serializer.serialize_str("0001-01-01T00:00:00Z"),
    }
}
