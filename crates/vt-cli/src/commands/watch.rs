//! Long-running aggregation loops.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use vt_core::Scheduler;

use crate::Config;
use crate::store::AnyStore;

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Only maintain all-time totals.
    #[arg(long, conflicts_with = "monthly_only")]
    pub continuous_only: bool,

    /// Only maintain monthly totals.
    #[arg(long)]
    pub monthly_only: bool,
}

/// Runs until Ctrl-C. A pass in flight is allowed to finish.
pub fn run(args: &WatchArgs, config: &Config) -> Result<()> {
    let store = AnyStore::open(config)?;
    let scheduler = Scheduler::new(Arc::new(store), config.scheduler_config()?);

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    runtime.block_on(async {
        let shutdown = CancellationToken::new();
        let signal_token = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("shutdown requested");
                    signal_token.cancel();
                }
                Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
            }
        });

        if args.continuous_only {
            scheduler.run_continuous(shutdown).await;
        } else if args.monthly_only {
            scheduler.run_monthly(shutdown).await;
        } else {
            scheduler.run(shutdown).await;
        }
    });

    tracing::info!("aggregation stopped");
    Ok(())
}
