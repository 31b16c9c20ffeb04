//! Storage layer for voicetime.
//!
//! Provides persistence for the voice event log and the derived aggregates using
//! `rusqlite`, plus [`SqliteStore`], a [`vt_core::Store`] over it.
//!
//! # Thread Safety
//!
//! [`Database`] wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! [`SqliteStore`] serializes access with a `Mutex<Database>`.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 with millisecond precision and a `Z`
//! suffix (e.g. `2025-03-10T09:00:00.000Z`), so lexicographic order matches
//! chronological order and month ranges can be filtered with plain comparisons.
//!
//! ## Snowflakes
//!
//! Discord snowflakes (`guild_id`, `discord_id`) are `u64` in the domain and are
//! stored as INTEGER. Values above `i64::MAX` are rejected rather than wrapped.

mod store;

use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;
use vt_core::{
    ActivityAction, AggregateId, Event, GuildId, MonthBucket, MonthTimeSpent, TimeSpent, User,
    UserId,
};

pub use store::SqliteStore;

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Failed to parse a stored timestamp.
    #[error("invalid timestamp for {record_id}: {timestamp}")]
    TimestampParse {
        record_id: String,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored column could not be decoded into its domain type.
    #[error("invalid data for {record_id}: {message}")]
    InvalidData { record_id: String, message: String },
    /// A snowflake does not fit in a SQLite INTEGER.
    #[error("snowflake {0} is out of range")]
    SnowflakeOutOfRange(u64),
    /// An update referenced an aggregate that is not stored for that pair.
    #[error("no aggregate {id} for this user and guild")]
    UnknownAggregate { id: AggregateId },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Row counts reported by `vt status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub users: i64,
    pub events: i64,
    pub time_spent: i64,
    pub month_time_spent: i64,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                discord_id INTEGER NOT NULL DEFAULT 0,
                username TEXT NOT NULL DEFAULT ''
            );

            -- Events table: raw voice state changes, never modified by aggregation
            -- action: 'joined' | 'switched' | 'left'
            -- created: RFC 3339 UTC (e.g., '2025-03-10T09:00:00.000Z')
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                guild_id INTEGER NOT NULL,
                action TEXT NOT NULL,
                created TEXT NOT NULL,
                transaction_id TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_events_pair ON events(user_id, guild_id, created);
            CREATE INDEX IF NOT EXISTS idx_events_transaction ON events(transaction_id);

            CREATE TABLE IF NOT EXISTS time_spent (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                guild_id INTEGER NOT NULL,
                last_active_at TEXT,
                total_minutes INTEGER NOT NULL DEFAULT 0,
                display TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, guild_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_time_spent_guild ON time_spent(guild_id, total_minutes);

            CREATE TABLE IF NOT EXISTS month_time_spent (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                guild_id INTEGER NOT NULL,
                month_id INTEGER NOT NULL,
                total_minutes INTEGER NOT NULL DEFAULT 0,
                display TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, guild_id, month_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            ",
        )?;
        Ok(())
    }

    /// Inserts users, refreshing the Discord ID and name of existing ones.
    pub fn upsert_users(&mut self, users: &[User]) -> Result<usize, DbError> {
        if users.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO users (id, discord_id, username)
                VALUES (?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    discord_id = excluded.discord_id,
                    username = excluded.username
                ",
            )?;
            for user in users {
                written += stmt.execute(params![
                    user.id.to_string(),
                    snowflake_to_sql(user.discord_id)?,
                    user.username,
                ])?;
            }
        }
        tx.commit()?;
        Ok(written)
    }

    /// Inserts a batch of events, ignoring duplicates by ID.
    ///
    /// Every referenced user must already exist.
    pub fn insert_events(&mut self, events: &[Event]) -> Result<usize, DbError> {
        if events.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "
                INSERT OR IGNORE INTO events
                (id, user_id, guild_id, action, created, transaction_id)
                VALUES (?, ?, ?, ?, ?, ?)
                ",
            )?;
            for event in events {
                inserted += stmt.execute(params![
                    event.id.to_string(),
                    event.user_id.to_string(),
                    snowflake_to_sql(event.guild_id.get())?,
                    event.action.as_str(),
                    format_timestamp(event.created),
                    event.transaction_id.to_string(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Lists users ordered by name then ID.
    pub fn list_users(&self) -> Result<Vec<User>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, discord_id, username
            FROM users
            ORDER BY username ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut users = Vec::new();
        for row in rows {
            let (id, discord_id, username) = row?;
            users.push(User {
                id: parse_id(&id, &id)?,
                discord_id: snowflake_from_sql(discord_id, &id)?,
                username,
            });
        }
        Ok(users)
    }

    /// Distinct guilds the user has at least one event in, ascending.
    pub fn list_guild_ids_for_user(&self, user_id: UserId) -> Result<Vec<GuildId>, DbError> {
        let user = user_id.to_string();
        let mut stmt = self.conn.prepare(
            "
            SELECT DISTINCT guild_id
            FROM events
            WHERE user_id = ?
            ORDER BY guild_id ASC
            ",
        )?;
        let rows = stmt.query_map([&user], |row| row.get::<_, i64>(0))?;
        let mut guilds = Vec::new();
        for row in rows {
            guilds.push(GuildId::new(snowflake_from_sql(row?, &user)?));
        }
        Ok(guilds)
    }

    /// Lists one pair's events ordered by creation time then ID.
    ///
    /// With `month`, only events created inside the bucket's UTC range are returned.
    pub fn list_events(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: Option<MonthBucket>,
    ) -> Result<Vec<Event>, DbError> {
        let (start, end) = month.map(MonthBucket::range).unzip();
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, guild_id, action, created, transaction_id
            FROM events
            WHERE user_id = ?1 AND guild_id = ?2
                AND (?3 IS NULL OR created >= ?3)
                AND (?4 IS NULL OR created < ?4)
            ORDER BY created ASC, id ASC
            ",
        )?;
        let rows = stmt.query_map(
            params![
                user_id.to_string(),
                snowflake_to_sql(guild_id.get())?,
                start.map(format_timestamp),
                end.map(format_timestamp),
            ],
            |row| {
                Ok(EventRow {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    guild_id: row.get(2)?,
                    action: row.get(3)?,
                    created: row.get(4)?,
                    transaction_id: row.get(5)?,
                })
            },
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    pub fn fetch_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Option<TimeSpent>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, user_id, guild_id, last_active_at, total_minutes, display
                FROM time_spent
                WHERE user_id = ? AND guild_id = ?
                ",
                params![user_id.to_string(), snowflake_to_sql(guild_id.get())?],
                TimeSpentRow::from_row,
            )
            .optional()?;
        row.map(TimeSpentRow::into_aggregate).transpose()
    }

    /// Creates or overwrites the all-time aggregate of a pair.
    ///
    /// With `id: None` the pair's existing record (if any) is overwritten and
    /// its ID returned; otherwise a fresh ID is assigned. With `id: Some`, the
    /// record must exist for the same pair.
    pub fn upsert_time_spent(
        &mut self,
        aggregate: &TimeSpent,
        now: DateTime<Utc>,
    ) -> Result<TimeSpent, DbError> {
        let guild = snowflake_to_sql(aggregate.guild_id.get())?;
        let last_active_at = aggregate.last_active_at.map(format_timestamp);
        let updated_at = format_timestamp(now);

        let id = match aggregate.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "
                    UPDATE time_spent
                    SET last_active_at = ?, total_minutes = ?, display = ?, updated_at = ?
                    WHERE id = ? AND user_id = ? AND guild_id = ?
                    ",
                    params![
                        last_active_at,
                        aggregate.total_minutes,
                        aggregate.display,
                        updated_at,
                        id.to_string(),
                        aggregate.user_id.to_string(),
                        guild,
                    ],
                )?;
                if changed == 0 {
                    tracing::debug!(%id, user_id = %aggregate.user_id, "time spent id not found");
                    return Err(DbError::UnknownAggregate { id });
                }
                id
            }
            None => {
                let stored: String = self.conn.query_row(
                    "
                    INSERT INTO time_spent
                    (id, user_id, guild_id, last_active_at, total_minutes, display, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(user_id, guild_id) DO UPDATE SET
                        last_active_at = excluded.last_active_at,
                        total_minutes = excluded.total_minutes,
                        display = excluded.display,
                        updated_at = excluded.updated_at
                    RETURNING id
                    ",
                    params![
                        AggregateId::new_v4().to_string(),
                        aggregate.user_id.to_string(),
                        guild,
                        last_active_at,
                        aggregate.total_minutes,
                        aggregate.display,
                        updated_at,
                    ],
                    |row| row.get(0),
                )?;
                parse_id(&stored, &stored)?
            }
        };

        Ok(TimeSpent {
            id: Some(id),
            ..aggregate.clone()
        })
    }

    pub fn fetch_month_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: MonthBucket,
    ) -> Result<Option<MonthTimeSpent>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT id, user_id, guild_id, month_id, total_minutes, display
                FROM month_time_spent
                WHERE user_id = ? AND guild_id = ? AND month_id = ?
                ",
                params![
                    user_id.to_string(),
                    snowflake_to_sql(guild_id.get())?,
                    month.id()
                ],
                MonthTimeSpentRow::from_row,
            )
            .optional()?;
        row.map(MonthTimeSpentRow::into_aggregate).transpose()
    }

    /// Creates or overwrites the aggregate of a pair for one month.
    ///
    /// Follows the same ID rules as [`Database::upsert_time_spent`].
    pub fn upsert_month_time_spent(
        &mut self,
        aggregate: &MonthTimeSpent,
        now: DateTime<Utc>,
    ) -> Result<MonthTimeSpent, DbError> {
        let guild = snowflake_to_sql(aggregate.guild_id.get())?;
        let updated_at = format_timestamp(now);

        let id = match aggregate.id {
            Some(id) => {
                let changed = self.conn.execute(
                    "
                    UPDATE month_time_spent
                    SET total_minutes = ?, display = ?, updated_at = ?
                    WHERE id = ? AND user_id = ? AND guild_id = ? AND month_id = ?
                    ",
                    params![
                        aggregate.total_minutes,
                        aggregate.display,
                        updated_at,
                        id.to_string(),
                        aggregate.user_id.to_string(),
                        guild,
                        aggregate.month.id(),
                    ],
                )?;
                if changed == 0 {
                    tracing::debug!(
                        %id,
                        user_id = %aggregate.user_id,
                        month = %aggregate.month,
                        "month time spent id not found"
                    );
                    return Err(DbError::UnknownAggregate { id });
                }
                id
            }
            None => {
                let stored: String = self.conn.query_row(
                    "
                    INSERT INTO month_time_spent
                    (id, user_id, guild_id, month_id, total_minutes, display, updated_at)
                    VALUES (?, ?, ?, ?, ?, ?, ?)
                    ON CONFLICT(user_id, guild_id, month_id) DO UPDATE SET
                        total_minutes = excluded.total_minutes,
                        display = excluded.display,
                        updated_at = excluded.updated_at
                    RETURNING id
                    ",
                    params![
                        AggregateId::new_v4().to_string(),
                        aggregate.user_id.to_string(),
                        guild,
                        aggregate.month.id(),
                        aggregate.total_minutes,
                        aggregate.display,
                        updated_at,
                    ],
                    |row| row.get(0),
                )?;
                parse_id(&stored, &stored)?
            }
        };

        Ok(MonthTimeSpent {
            id: Some(id),
            ..aggregate.clone()
        })
    }

    /// Highest all-time totals in a guild, ties broken by user ID.
    pub fn top_time_spent(&self, guild_id: GuildId, limit: usize) -> Result<Vec<TimeSpent>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, guild_id, last_active_at, total_minutes, display
            FROM time_spent
            WHERE guild_id = ?
            ORDER BY total_minutes DESC, user_id ASC
            LIMIT ?
            ",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![snowflake_to_sql(guild_id.get())?, limit],
            TimeSpentRow::from_row,
        )?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_aggregate()?);
        }
        Ok(entries)
    }

    /// Months with a stored aggregate for a pair, most recent first.
    pub fn list_month_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Vec<MonthTimeSpent>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, user_id, guild_id, month_id, total_minutes, display
            FROM month_time_spent
            WHERE user_id = ? AND guild_id = ?
            ORDER BY month_id DESC
            ",
        )?;
        let rows = stmt.query_map(
            params![user_id.to_string(), snowflake_to_sql(guild_id.get())?],
            MonthTimeSpentRow::from_row,
        )?;
        let mut months = Vec::new();
        for row in rows {
            months.push(row?.into_aggregate()?);
        }
        Ok(months)
    }

    /// Looks up a user by ID.
    pub fn find_user(&self, user_id: UserId) -> Result<Option<User>, DbError> {
        let id = user_id.to_string();
        let row = self
            .conn
            .query_row(
                "SELECT discord_id, username FROM users WHERE id = ?",
                [&id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;
        row.map(|(discord_id, username)| {
            Ok(User {
                id: user_id,
                discord_id: snowflake_from_sql(discord_id, &id)?,
                username,
            })
        })
        .transpose()
    }

    /// Counts rows in each table.
    pub fn counts(&self) -> Result<StoreCounts, DbError> {
        let count = |table: &str| -> Result<i64, DbError> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
        };
        Ok(StoreCounts {
            users: count("users")?,
            events: count("events")?,
            time_spent: count("time_spent")?,
            month_time_spent: count("month_time_spent")?,
        })
    }

    /// Latest event timestamp in the log, if any.
    pub fn last_event_at(&self) -> Result<Option<DateTime<Utc>>, DbError> {
        let latest: Option<String> =
            self.conn
                .query_row("SELECT MAX(created) FROM events", [], |row| row.get(0))?;
        latest
            .map(|value| parse_timestamp(&value, "events"))
            .transpose()
    }
}

#[derive(Debug)]
struct EventRow {
    id: String,
    user_id: String,
    guild_id: i64,
    action: String,
    created: String,
    transaction_id: String,
}

impl EventRow {
    fn into_event(self) -> Result<Event, DbError> {
        let action = self
            .action
            .parse::<ActivityAction>()
            .map_err(|err| DbError::InvalidData {
                record_id: self.id.clone(),
                message: err.to_string(),
            })?;
        Ok(Event {
            id: parse_id(&self.id, &self.id)?,
            user_id: parse_id(&self.user_id, &self.id)?,
            guild_id: GuildId::new(snowflake_from_sql(self.guild_id, &self.id)?),
            action,
            created: parse_timestamp(&self.created, &self.id)?,
            transaction_id: parse_id(&self.transaction_id, &self.id)?,
        })
    }
}

#[derive(Debug)]
struct TimeSpentRow {
    id: String,
    user_id: String,
    guild_id: i64,
    last_active_at: Option<String>,
    total_minutes: i64,
    display: String,
}

impl TimeSpentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            guild_id: row.get(2)?,
            last_active_at: row.get(3)?,
            total_minutes: row.get(4)?,
            display: row.get(5)?,
        })
    }

    fn into_aggregate(self) -> Result<TimeSpent, DbError> {
        Ok(TimeSpent {
            id: Some(parse_id(&self.id, &self.id)?),
            user_id: parse_id(&self.user_id, &self.id)?,
            guild_id: GuildId::new(snowflake_from_sql(self.guild_id, &self.id)?),
            last_active_at: self
                .last_active_at
                .as_deref()
                .map(|value| parse_timestamp(value, &self.id))
                .transpose()?,
            total_minutes: self.total_minutes,
            display: self.display,
        })
    }
}

#[derive(Debug)]
struct MonthTimeSpentRow {
    id: String,
    user_id: String,
    guild_id: i64,
    month_id: i64,
    total_minutes: i64,
    display: String,
}

impl MonthTimeSpentRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            guild_id: row.get(2)?,
            month_id: row.get(3)?,
            total_minutes: row.get(4)?,
            display: row.get(5)?,
        })
    }

    fn into_aggregate(self) -> Result<MonthTimeSpent, DbError> {
        let month = MonthBucket::try_from(self.month_id).map_err(|err| DbError::InvalidData {
            record_id: self.id.clone(),
            message: err.to_string(),
        })?;
        Ok(MonthTimeSpent {
            id: Some(parse_id(&self.id, &self.id)?),
            user_id: parse_id(&self.user_id, &self.id)?,
            guild_id: GuildId::new(snowflake_from_sql(self.guild_id, &self.id)?),
            month,
            total_minutes: self.total_minutes,
            display: self.display,
        })
    }
}

fn parse_id<T>(value: &str, record_id: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: Display,
{
    value.parse().map_err(|err: T::Err| DbError::InvalidData {
        record_id: record_id.to_string(),
        message: format!("invalid id {value:?}: {err}"),
    })
}

fn parse_timestamp(timestamp: &str, record_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            record_id: record_id.to_string(),
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn snowflake_to_sql(value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::SnowflakeOutOfRange(value))
}

fn snowflake_from_sql(value: i64, record_id: &str) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| DbError::InvalidData {
        record_id: record_id.to_string(),
        message: format!("negative snowflake {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use chrono::TimeZone;
    use uuid::Uuid;
    use vt_core::{EventId, TransactionId};

    fn at(d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, d, h, mi, 0).unwrap()
    }

    fn user(n: u128) -> User {
        User {
            id: UserId::from_uuid(Uuid::from_u128(n)),
            discord_id: 1_000 + u64::try_from(n).unwrap(),
            username: format!("user-{n}"),
        }
    }

    fn event(
        user: &User,
        guild: u64,
        action: ActivityAction,
        created: DateTime<Utc>,
        tx: u128,
    ) -> Event {
        Event {
            id: EventId::new_v4(),
            user_id: user.id,
            guild_id: GuildId::new(guild),
            action,
            created,
            transaction_id: TransactionId::from_uuid(Uuid::from_u128(0xF000 + tx)),
        }
    }

    fn seeded() -> (Database, User) {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let alice = user(1);
        db.upsert_users(&[alice.clone()]).unwrap();
        (db, alice)
    }

    fn table_columns(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({table})"))
            .expect("prepare table_info");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query table_info");
        rows.map(|row| row.expect("table_info row")).collect()
    }

    fn index_names(conn: &Connection, table: &str) -> HashSet<String> {
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({table})"))
            .expect("prepare index_list");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .expect("query index_list");
        rows.map(|row| row.expect("index_list row")).collect()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_matches_data_model() {
        let db = Database::open_in_memory().expect("open in-memory db");

        assert_eq!(
            table_columns(&db.conn, "events"),
            vec!["id", "user_id", "guild_id", "action", "created", "transaction_id"]
        );
        assert_eq!(
            table_columns(&db.conn, "time_spent"),
            vec![
                "id",
                "user_id",
                "guild_id",
                "last_active_at",
                "total_minutes",
                "display",
                "updated_at",
            ]
        );
        assert_eq!(
            table_columns(&db.conn, "month_time_spent"),
            vec![
                "id",
                "user_id",
                "guild_id",
                "month_id",
                "total_minutes",
                "display",
                "updated_at",
            ]
        );

        let event_indexes = index_names(&db.conn, "events");
        assert!(event_indexes.contains("idx_events_pair"));
        assert!(event_indexes.contains("idx_events_transaction"));
    }

    #[test]
    fn insert_events_is_idempotent() {
        let (mut db, alice) = seeded();
        let joined = event(&alice, 7, ActivityAction::Joined, at(10, 9, 0), 1);

        let inserted = db.insert_events(&[joined.clone(), joined]).unwrap();
        assert_eq!(inserted, 1);
        assert_eq!(db.counts().unwrap().events, 1);
    }

    #[test]
    fn events_for_unknown_user_are_rejected() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let ghost = user(9);
        let joined = event(&ghost, 7, ActivityAction::Joined, at(10, 9, 0), 1);
        let result = db.insert_events(&[joined]);
        assert!(matches!(result, Err(DbError::Sqlite(_))));
    }

    #[test]
    fn upsert_users_refreshes_name() {
        let (mut db, mut alice) = seeded();
        alice.username = "alice".to_string();
        db.upsert_users(&[alice.clone()]).unwrap();

        assert_eq!(db.list_users().unwrap(), vec![alice.clone()]);
        assert_eq!(db.find_user(alice.id).unwrap(), Some(alice));
    }

    #[test]
    fn list_events_round_trips_and_orders_rows() {
        let (mut db, alice) = seeded();
        let left = event(&alice, 7, ActivityAction::Left, at(10, 9, 50), 1);
        let joined = event(&alice, 7, ActivityAction::Joined, at(10, 9, 0), 1);
        let other_guild = event(&alice, 8, ActivityAction::Joined, at(10, 9, 5), 2);
        db.insert_events(&[left.clone(), joined.clone(), other_guild])
            .unwrap();

        let events = db.list_events(alice.id, GuildId::new(7), None).unwrap();
        assert_eq!(events, vec![joined, left]);
    }

    #[test]
    fn list_events_filters_by_month_range() {
        let (mut db, alice) = seeded();
        let feb_end = Utc.with_ymd_and_hms(2025, 2, 28, 23, 59, 59).unwrap();
        let mar_start = Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap();
        let apr_start = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        db.insert_events(&[
            event(&alice, 7, ActivityAction::Joined, feb_end, 1),
            event(&alice, 7, ActivityAction::Left, mar_start, 1),
            event(&alice, 7, ActivityAction::Joined, apr_start, 2),
        ])
        .unwrap();

        let march = MonthBucket::try_from(202_503).unwrap();
        let events = db.list_events(alice.id, GuildId::new(7), Some(march)).unwrap();
        let created: Vec<DateTime<Utc>> = events.iter().map(|e| e.created).collect();
        assert_eq!(created, vec![mar_start]);
    }

    #[test]
    fn guild_ids_are_distinct() {
        let (mut db, alice) = seeded();
        db.insert_events(&[
            event(&alice, 8, ActivityAction::Joined, at(10, 9, 0), 1),
            event(&alice, 7, ActivityAction::Joined, at(10, 10, 0), 2),
            event(&alice, 7, ActivityAction::Left, at(10, 11, 0), 2),
        ])
        .unwrap();

        assert_eq!(
            db.list_guild_ids_for_user(alice.id).unwrap(),
            vec![GuildId::new(7), GuildId::new(8)]
        );
    }

    #[test]
    fn upsert_time_spent_creates_then_updates_in_place() {
        let (mut db, alice) = seeded();
        let guild = GuildId::new(7);
        assert_eq!(db.fetch_time_spent(alice.id, guild).unwrap(), None);

        let mut aggregate = TimeSpent::empty(alice.id, guild);
        aggregate.total_minutes = 50;
        aggregate.display = "50 minutes".to_string();
        aggregate.last_active_at = Some(at(10, 9, 50));
        let created = db.upsert_time_spent(&aggregate, at(10, 10, 0)).unwrap();
        assert!(created.id.is_some());

        let mut updated = created.clone();
        updated.total_minutes = 65;
        updated.display = "1 hour and 5 minutes".to_string();
        db.upsert_time_spent(&updated, at(10, 11, 0)).unwrap();

        let stored = db.fetch_time_spent(alice.id, guild).unwrap().unwrap();
        assert_eq!(stored, updated);
        assert_eq!(db.counts().unwrap().time_spent, 1);
    }

    #[test]
    fn upsert_without_id_reuses_existing_record() {
        let (mut db, alice) = seeded();
        let guild = GuildId::new(7);
        let first = db
            .upsert_time_spent(&TimeSpent::empty(alice.id, guild), at(10, 10, 0))
            .unwrap();
        let second = db
            .upsert_time_spent(&TimeSpent::empty(alice.id, guild), at(10, 11, 0))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.counts().unwrap().time_spent, 1);
    }

    #[test]
    fn upsert_with_unknown_id_is_rejected() {
        let (mut db, alice) = seeded();
        let id = AggregateId::new_v4();
        let mut aggregate = TimeSpent::empty(alice.id, GuildId::new(7));
        aggregate.id = Some(id);

        let err = db.upsert_time_spent(&aggregate, at(10, 10, 0)).unwrap_err();
        assert!(matches!(err, DbError::UnknownAggregate { id: got } if got == id));
    }

    #[test]
    fn month_aggregates_are_keyed_by_bucket() {
        let (mut db, alice) = seeded();
        let guild = GuildId::new(7);
        let feb = MonthBucket::try_from(202_502).unwrap();
        let mar = MonthBucket::try_from(202_503).unwrap();

        let mut february = MonthTimeSpent::empty(alice.id, guild, feb);
        february.total_minutes = 40;
        february.display = "40 minutes".to_string();
        let february = db.upsert_month_time_spent(&february, at(1, 0, 0)).unwrap();

        let mut march = MonthTimeSpent::empty(alice.id, guild, mar);
        march.total_minutes = 75;
        march.display = "1 hour and 15 minutes".to_string();
        let march = db.upsert_month_time_spent(&march, at(1, 0, 0)).unwrap();

        assert_eq!(
            db.fetch_month_time_spent(alice.id, guild, feb).unwrap(),
            Some(february.clone())
        );
        assert_eq!(
            db.list_month_time_spent(alice.id, guild).unwrap(),
            vec![march, february]
        );
    }

    #[test]
    fn top_time_spent_orders_by_minutes() {
        let mut db = Database::open_in_memory().expect("open in-memory db");
        let users: Vec<User> = (1..=4).map(user).collect();
        db.upsert_users(&users).unwrap();
        let guild = GuildId::new(7);
        for (user, minutes) in users.iter().zip([30, 300, 30, 5]) {
            let mut aggregate = TimeSpent::empty(user.id, guild);
            aggregate.total_minutes = minutes;
            db.upsert_time_spent(&aggregate, at(10, 0, 0)).unwrap();
        }

        let top: Vec<(UserId, i64)> = db
            .top_time_spent(guild, 3)
            .unwrap()
            .into_iter()
            .map(|t| (t.user_id, t.total_minutes))
            .collect();
        assert_eq!(
            top,
            vec![(users[1].id, 300), (users[0].id, 30), (users[2].id, 30)]
        );
    }

    #[test]
    fn oversized_snowflake_is_rejected() {
        let (mut db, alice) = seeded();
        let joined = event(&alice, u64::MAX, ActivityAction::Joined, at(10, 9, 0), 1);
        let result = db.insert_events(&[joined]);
        assert!(matches!(result, Err(DbError::SnowflakeOutOfRange(u64::MAX))));
    }

    #[test]
    fn last_event_at_tracks_latest_event() {
        let (mut db, alice) = seeded();
        assert_eq!(db.last_event_at().unwrap(), None);
        db.insert_events(&[
            event(&alice, 7, ActivityAction::Joined, at(10, 9, 0), 1),
            event(&alice, 7, ActivityAction::Left, at(12, 9, 0), 1),
        ])
        .unwrap();
        assert_eq!(db.last_event_at().unwrap(), Some(at(12, 9, 0)));
    }
}
