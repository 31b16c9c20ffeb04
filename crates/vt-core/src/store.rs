//! The store gateway the aggregation engine reads from and writes to.
//!
//! The engine never owns persistence. Implementations exist for a local
//! `SQLite` database (`vt-db`) and for the activity HTTP API (`vt-api`).
//!
//! # Upsert semantics
//!
//! An aggregate with `id: None` is created and returned with its ID assigned.
//! An aggregate with an ID replaces the stored record's fields in place; an ID
//! the store does not know (or that belongs to another pair) is reported as
//! [`StoreError::Conflict`] and is not retried.

use std::future::Future;

use thiserror::Error;

use crate::aggregate::{MonthTimeSpent, TimeSpent};
use crate::month::MonthBucket;
use crate::types::{AggregateId, Event, GuildId, User, UserId};

/// Store gateway errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or timed out.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// An upsert referenced an aggregate that does not match the stored record.
    #[error("aggregate {id} conflicts with the stored record")]
    Conflict { id: AggregateId },
    /// A record came back in a shape that could not be decoded.
    #[error("invalid record: {0}")]
    InvalidData(String),
    /// Any other backend failure.
    #[error("store error: {0}")]
    Backend(String),
}

/// Fetch/upsert contract over the event log and the aggregate records.
///
/// Not-found is `Ok(None)`, never an error, so a missing aggregate and a
/// failing store stay distinguishable.
pub trait Store: Send + Sync {
    fn list_users(&self) -> impl Future<Output = Result<Vec<User>, StoreError>> + Send;

    /// Guilds the user has voice activity in. May contain duplicates.
    fn list_guild_ids_for_user(
        &self,
        user_id: UserId,
    ) -> impl Future<Output = Result<Vec<GuildId>, StoreError>> + Send;

    /// Events for one pair in any order, optionally limited to one month.
    fn list_events(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: Option<MonthBucket>,
    ) -> impl Future<Output = Result<Vec<Event>, StoreError>> + Send;

    fn fetch_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> impl Future<Output = Result<Option<TimeSpent>, StoreError>> + Send;

    fn upsert_time_spent(
        &self,
        aggregate: TimeSpent,
    ) -> impl Future<Output = Result<TimeSpent, StoreError>> + Send;

    fn fetch_month_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: MonthBucket,
    ) -> impl Future<Output = Result<Option<MonthTimeSpent>, StoreError>> + Send;

    fn upsert_month_time_spent(
        &self,
        aggregate: MonthTimeSpent,
    ) -> impl Future<Output = Result<MonthTimeSpent, StoreError>> + Send;

    fn current_month_bucket(&self) -> impl Future<Output = Result<MonthBucket, StoreError>> + Send;

    fn last_month_bucket(&self) -> impl Future<Output = Result<MonthBucket, StoreError>> + Send;
}
