use std::fmt;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use vt_core::{
    Event, GuildId, MonthBucket, MonthTimeSpent, Store, StoreError, TimeSpent, User, UserId,
};

use crate::{Database, DbError};

type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// [`Store`] over a local [`Database`].
///
/// The current and previous month buckets are derived from the store's clock,
/// which defaults to the system clock.
pub struct SqliteStore {
    db: Mutex<Database>,
    clock: Clock,
}

impl fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self::with_clock(db, Utc::now)
    }

    /// Uses `clock` instead of the system clock for month buckets and `updated_at`.
    pub fn with_clock(
        db: Database,
        clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static,
    ) -> Self {
        Self {
            db: Mutex::new(db),
            clock: Box::new(clock),
        }
    }

    /// Runs `f` with exclusive access to the database.
    pub fn with_db<T>(
        &self,
        f: impl FnOnce(&mut Database) -> Result<T, DbError>,
    ) -> Result<T, StoreError> {
        let mut db = self.lock()?;
        Ok(f(&mut db)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>, StoreError> {
        self.db
            .lock()
            .map_err(|_| StoreError::Backend("database lock poisoned".to_string()))
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::UnknownAggregate { id } => Self::Conflict { id },
            DbError::TimestampParse { .. }
            | DbError::InvalidData { .. }
            | DbError::SnowflakeOutOfRange(_) => {
                tracing::warn!(error = %err, "stored record could not be decoded");
                Self::InvalidData(err.to_string())
            }
            DbError::Sqlite(_) => Self::Backend(err.to_string()),
        }
    }
}

impl Store for SqliteStore {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        self.with_db(|db| db.list_users())
    }

    async fn list_guild_ids_for_user(&self, user_id: UserId) -> Result<Vec<GuildId>, StoreError> {
        self.with_db(|db| db.list_guild_ids_for_user(user_id))
    }

    async fn list_events(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: Option<MonthBucket>,
    ) -> Result<Vec<Event>, StoreError> {
        self.with_db(|db| db.list_events(user_id, guild_id, month))
    }

    async fn fetch_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Option<TimeSpent>, StoreError> {
        self.with_db(|db| db.fetch_time_spent(user_id, guild_id))
    }

    async fn upsert_time_spent(&self, aggregate: TimeSpent) -> Result<TimeSpent, StoreError> {
        let now = self.now();
        self.with_db(|db| db.upsert_time_spent(&aggregate, now))
    }

    async fn fetch_month_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: MonthBucket,
    ) -> Result<Option<MonthTimeSpent>, StoreError> {
        self.with_db(|db| db.fetch_month_time_spent(user_id, guild_id, month))
    }

    async fn upsert_month_time_spent(
        &self,
        aggregate: MonthTimeSpent,
    ) -> Result<MonthTimeSpent, StoreError> {
        let now = self.now();
        self.with_db(|db| db.upsert_month_time_spent(&aggregate, now))
    }

    async fn current_month_bucket(&self) -> Result<MonthBucket, StoreError> {
        Ok(MonthBucket::of(self.now()))
    }

    async fn last_month_bucket(&self) -> Result<MonthBucket, StoreError> {
        Ok(MonthBucket::previous_of(self.now()))
    }
}
