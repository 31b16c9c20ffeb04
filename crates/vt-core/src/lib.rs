//! Core aggregation engine for voice-channel activity.
//!
//! This crate contains the domain types and logic for:
//! - Session reconstruction: turning join/switch/leave events into intervals
//! - Duration accumulation and month bucketing
//! - Aggregation scheduling: the continuous and monthly re-derivation loops
//!
//! Persistence is abstracted behind [`Store`]; see `vt-db` and `vt-api`.

pub mod action;
pub mod aggregate;
pub mod duration;
pub mod month;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod types;

pub use action::{ActivityAction, UnknownAction};
pub use aggregate::{
    MonthTimeSpent, SessionTotals, TimeSpent, compute_month_totals, compute_totals, leaderboard,
};
pub use duration::DurationAccumulator;
pub use month::{MonthBucket, MonthBucketError};
pub use scheduler::{PassReport, Scheduler, SchedulerConfig, Variant};
pub use session::{Session, SessionEnd, accumulate, reconstruct_sessions};
pub use store::{Store, StoreError};
pub use types::{AggregateId, Event, EventId, GuildId, TransactionId, User, UserId};
