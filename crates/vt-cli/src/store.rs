//! Backend selection for the configured store.

use anyhow::{Context, Result};
use vt_core::{
    Event, GuildId, MonthBucket, MonthTimeSpent, Store, StoreError, TimeSpent, User, UserId,
};
use vt_db::{Database, SqliteStore};

use crate::config::{Backend, Config};

/// The store selected by `Config::backend`.
#[derive(Debug)]
pub enum AnyStore {
    Sqlite(SqliteStore),
    Api(vt_api::Client),
}

/// Opens the local database, creating its parent directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

impl AnyStore {
    pub fn open(config: &Config) -> Result<Self> {
        match config.backend {
            Backend::Sqlite => Ok(Self::Sqlite(SqliteStore::new(open_database(config)?))),
            Backend::Api => {
                let base_url = config
                    .api_base_url
                    .as_deref()
                    .ok_or_else(|| anyhow::anyhow!("backend = \"api\" requires api_base_url"))?;
                let client = vt_api::Client::new(
                    base_url,
                    config.api_token.clone(),
                    config.request_timeout(),
                )
                .context("failed to create API client")?;
                Ok(Self::Api(client))
            }
        }
    }

    /// Highest all-time totals in a guild.
    pub async fn leaderboard(
        &self,
        guild_id: GuildId,
        limit: usize,
    ) -> Result<Vec<TimeSpent>, StoreError> {
        match self {
            Self::Sqlite(store) => store.with_db(|db| db.top_time_spent(guild_id, limit)),
            Self::Api(client) => {
                let mut top = client.top_ten(guild_id).await?;
                top.truncate(limit);
                Ok(top)
            }
        }
    }

    pub async fn user(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        match self {
            Self::Sqlite(store) => store.with_db(|db| db.find_user(user_id)),
            Self::Api(client) => Ok(client.user(user_id).await?),
        }
    }
}

/// Forwards a `Store` call to whichever backend is active.
macro_rules! dispatch {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            AnyStore::Sqlite($store) => $call.await,
            AnyStore::Api($store) => $call.await,
        }
    };
}

impl Store for AnyStore {
    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        dispatch!(self, store => store.list_users())
    }

    async fn list_guild_ids_for_user(&self, user_id: UserId) -> Result<Vec<GuildId>, StoreError> {
        dispatch!(self, store => store.list_guild_ids_for_user(user_id))
    }

    async fn list_events(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: Option<MonthBucket>,
    ) -> Result<Vec<Event>, StoreError> {
        dispatch!(self, store => store.list_events(user_id, guild_id, month))
    }

    async fn fetch_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<Option<TimeSpent>, StoreError> {
        dispatch!(self, store => store.fetch_time_spent(user_id, guild_id))
    }

    async fn upsert_time_spent(&self, aggregate: TimeSpent) -> Result<TimeSpent, StoreError> {
        dispatch!(self, store => store.upsert_time_spent(aggregate))
    }

    async fn fetch_month_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: MonthBucket,
    ) -> Result<Option<MonthTimeSpent>, StoreError> {
        dispatch!(self, store => store.fetch_month_time_spent(user_id, guild_id, month))
    }

    async fn upsert_month_time_spent(
        &self,
        aggregate: MonthTimeSpent,
    ) -> Result<MonthTimeSpent, StoreError> {
        dispatch!(self, store => store.upsert_month_time_spent(aggregate))
    }

    async fn current_month_bucket(&self) -> Result<MonthBucket, StoreError> {
        dispatch!(self, store => store.current_month_bucket())
    }

    async fn last_month_bucket(&self) -> Result<MonthBucket, StoreError> {
        dispatch!(self, store => store.last_month_bucket())
    }
}
