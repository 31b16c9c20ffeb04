//! Periodic re-derivation of aggregates.
//!
//! Two independent loops share one store:
//!
//! - the **continuous** loop recomputes every all-time [`TimeSpent`] on a short
//!   interval from the unfiltered event set
//! - the **monthly** loop recomputes [`MonthTimeSpent`] for the previous and
//!   current month buckets on a long interval, skipping empty buckets
//!
//! Each loop processes (user, guild) pairs one after another. A failure for one
//! pair is logged and the pair is skipped until the next tick. Cancellation is
//! only observed before a pass and during the sleep, so a pass that has started
//! always completes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::aggregate::{MonthTimeSpent, TimeSpent, compute_month_totals, compute_totals};
use crate::month::MonthBucket;
use crate::store::{Store, StoreError};
use crate::types::{GuildId, UserId};

/// Tick intervals for the two loops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Interval between all-time passes. Default: 1 minute.
    pub continuous_interval: Duration,

    /// Interval between monthly passes. Default: 8 hours.
    pub monthly_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            continuous_interval: Duration::from_secs(60),
            monthly_interval: Duration::from_secs(8 * 60 * 60),
        }
    }
}

/// Which aggregate family a loop maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    Continuous,
    Monthly,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous => f.write_str("continuous"),
            Self::Monthly => f.write_str("monthly"),
        }
    }
}

/// Outcome counters for a single pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub users: usize,

    /// Users whose guild list could not be fetched.
    pub users_skipped: usize,

    /// Pairs whose aggregates were all recomputed and written (or skipped as empty).
    pub pairs_updated: usize,

    /// Pairs abandoned because a fetch or upsert failed.
    pub pairs_skipped: usize,

    /// Month aggregates written.
    pub buckets_written: usize,

    /// Month buckets not written because they had no time.
    pub buckets_empty: usize,
}

/// Drives the aggregation pipeline against a [`Store`].
pub struct Scheduler<S> {
    store: Arc<S>,
    config: SchedulerConfig,
}

impl<S> fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: Store> Scheduler<S> {
    pub const fn new(store: Arc<S>, config: SchedulerConfig) -> Self {
        Self { store, config }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub const fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Runs both loops concurrently until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        tokio::join!(
            self.run_continuous(shutdown.clone()),
            self.run_monthly(shutdown)
        );
    }

    /// Recomputes all-time aggregates every `continuous_interval`.
    pub async fn run_continuous(&self, shutdown: CancellationToken) {
        self.run_loop(Variant::Continuous, shutdown).await;
    }

    /// Recomputes monthly aggregates every `monthly_interval`.
    pub async fn run_monthly(&self, shutdown: CancellationToken) {
        self.run_loop(Variant::Monthly, shutdown).await;
    }

    async fn run_loop(&self, variant: Variant, shutdown: CancellationToken) {
        let interval = match variant {
            Variant::Continuous => self.config.continuous_interval,
            Variant::Monthly => self.config.monthly_interval,
        };
        tracing::info!(%variant, interval_secs = interval.as_secs(), "aggregation loop started");

        while !shutdown.is_cancelled() {
            let span = tracing::info_span!("aggregation_pass", %variant);
            tracing::info!(parent: &span, at = %chrono::Utc::now(), "aggregation pass running");
            let result = match variant {
                Variant::Continuous => self.continuous_pass().instrument(span).await,
                Variant::Monthly => self.monthly_pass().instrument(span).await,
            };
            match result {
                Ok(report) => tracing::info!(
                    %variant,
                    users = report.users,
                    updated = report.pairs_updated,
                    skipped = report.pairs_skipped,
                    "aggregation pass complete"
                ),
                Err(err) => tracing::warn!(%variant, error = %err, "aggregation pass failed"),
            }

            tokio::select! {
                () = shutdown.cancelled() => break,
                () = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!(%variant, "aggregation loop stopped");
    }

    /// Runs one all-time pass over every (user, guild) pair.
    ///
    /// Only a failure to list users fails the whole pass.
    pub async fn continuous_pass(&self) -> Result<PassReport, StoreError> {
        let users = self.store.list_users().await?;
        let mut report = PassReport {
            users: users.len(),
            ..PassReport::default()
        };

        for user in &users {
            let Some(guilds) = self.guilds_for(user.id, &mut report).await else {
                continue;
            };
            for guild_id in guilds {
                match self.refresh_time_spent(user.id, guild_id).await {
                    Ok(aggregate) => {
                        tracing::debug!(
                            user_id = %user.id,
                            %guild_id,
                            total_minutes = aggregate.total_minutes,
                            "time spent updated"
                        );
                        report.pairs_updated += 1;
                    }
                    Err(err) => {
                        tracing::warn!(
                            user_id = %user.id,
                            %guild_id,
                            error = %err,
                            "skipping time spent update"
                        );
                        report.pairs_skipped += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Runs one monthly pass for the previous and current month buckets.
    pub async fn monthly_pass(&self) -> Result<PassReport, StoreError> {
        let buckets = [
            self.store.last_month_bucket().await?,
            self.store.current_month_bucket().await?,
        ];
        let users = self.store.list_users().await?;
        let mut report = PassReport {
            users: users.len(),
            ..PassReport::default()
        };

        for user in &users {
            let Some(guilds) = self.guilds_for(user.id, &mut report).await else {
                continue;
            };
            for guild_id in guilds {
                match self.refresh_months(user.id, guild_id, &buckets).await {
                    Ok((written, empty)) => {
                        report.pairs_updated += 1;
                        report.buckets_written += written;
                        report.buckets_empty += empty;
                    }
                    Err(err) => {
                        tracing::warn!(
                            user_id = %user.id,
                            %guild_id,
                            error = %err,
                            "skipping month time spent update"
                        );
                        report.pairs_skipped += 1;
                    }
                }
            }
        }

        Ok(report)
    }

    /// Recomputes and stores the all-time aggregate for one pair.
    pub async fn refresh_time_spent(
        &self,
        user_id: UserId,
        guild_id: GuildId,
    ) -> Result<TimeSpent, StoreError> {
        let events = self.store.list_events(user_id, guild_id, None).await?;
        let mut aggregate = self
            .store
            .fetch_time_spent(user_id, guild_id)
            .await?
            .unwrap_or_else(|| TimeSpent::empty(user_id, guild_id));

        aggregate.apply(&compute_totals(&events));
        self.store.upsert_time_spent(aggregate).await
    }

    /// Recomputes and stores one month aggregate.
    ///
    /// Returns `None` without writing when the month has no time.
    pub async fn refresh_month(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        month: MonthBucket,
    ) -> Result<Option<MonthTimeSpent>, StoreError> {
        let events = self.store.list_events(user_id, guild_id, Some(month)).await?;
        let totals = compute_month_totals(&events, month);
        if totals.total_minutes() == 0 {
            tracing::debug!(user_id = %user_id, %guild_id, %month, "no time in month");
            return Ok(None);
        }

        let mut aggregate = self
            .store
            .fetch_month_time_spent(user_id, guild_id, month)
            .await?
            .unwrap_or_else(|| MonthTimeSpent::empty(user_id, guild_id, month));
        aggregate.apply(&totals);
        self.store.upsert_month_time_spent(aggregate).await.map(Some)
    }

    async fn refresh_months(
        &self,
        user_id: UserId,
        guild_id: GuildId,
        buckets: &[MonthBucket],
    ) -> Result<(usize, usize), StoreError> {
        let mut written = 0;
        let mut empty = 0;
        for &month in buckets {
            match self.refresh_month(user_id, guild_id, month).await? {
                Some(_) => written += 1,
                None => empty += 1,
            }
        }
        Ok((written, empty))
    }

    async fn guilds_for(&self, user_id: UserId, report: &mut PassReport) -> Option<Vec<GuildId>> {
        match self.store.list_guild_ids_for_user(user_id).await {
            Ok(mut guilds) => {
                guilds.sort_unstable();
                guilds.dedup();
                Some(guilds)
            }
            Err(err) => {
                tracing::warn!(user_id = %user_id, error = %err, "skipping user; guild lookup failed");
                report.users_skipped += 1;
                None
            }
        }
    }
}
