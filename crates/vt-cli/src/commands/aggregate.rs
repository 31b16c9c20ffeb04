//! One-shot aggregation pass.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;

use vt_core::{PassReport, Scheduler, Store, Variant};

use crate::Config;
use crate::store::AnyStore;

#[derive(Debug, Args)]
pub struct AggregateArgs {
    /// Recompute the current and previous month instead of all-time totals.
    #[arg(long)]
    pub monthly: bool,
}

pub fn run<W: Write>(writer: &mut W, args: &AggregateArgs, config: &Config) -> Result<()> {
    let store = AnyStore::open(config)?;
    let scheduler = Scheduler::new(Arc::new(store), config.scheduler_config()?);
    let variant = if args.monthly {
        Variant::Monthly
    } else {
        Variant::Continuous
    };

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let report = runtime.block_on(pass(&scheduler, variant))?;
    write_report(writer, variant, &report)
}

pub async fn pass<S: Store>(scheduler: &Scheduler<S>, variant: Variant) -> Result<PassReport> {
    let report = match variant {
        Variant::Continuous => scheduler.continuous_pass().await,
        Variant::Monthly => scheduler.monthly_pass().await,
    };
    report.with_context(|| format!("{variant} aggregation pass failed"))
}

fn write_report<W: Write>(writer: &mut W, variant: Variant, report: &PassReport) -> Result<()> {
    writeln!(writer, "{variant} pass complete")?;
    writeln!(
        writer,
        "Users: {} ({} skipped)",
        report.users, report.users_skipped
    )?;
    writeln!(
        writer,
        "Pairs: {} updated, {} skipped",
        report.pairs_updated, report.pairs_skipped
    )?;
    if variant == Variant::Monthly {
        writeln!(
            writer,
            "Months: {} written, {} empty",
            report.buckets_written, report.buckets_empty
        )?;
    }
    Ok(())
}
