//! Per-user summary, as the bot's `time-spent` command renders it.

use std::fmt;
use std::io::Write;

use anyhow::{Context, Result};
use chrono::TimeZone;
use clap::Args;

use vt_core::{GuildId, Store, TimeSpent, UserId};

use crate::Config;
use crate::store::AnyStore;

#[derive(Debug, Args)]
pub struct ShowArgs {
    /// User id (UUID).
    #[arg(long)]
    pub user: UserId,

    /// Guild snowflake.
    #[arg(long)]
    pub guild: u64,
}

pub fn run<W: Write>(writer: &mut W, args: &ShowArgs, config: &Config) -> Result<()> {
    let store = AnyStore::open(config)?;
    let guild_id = GuildId::new(args.guild);

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let (user, aggregate) = runtime.block_on(async {
        let user = store.user(args.user).await.context("failed to load user")?;
        let aggregate = store
            .fetch_time_spent(args.user, guild_id)
            .await
            .context("failed to load time spent")?;
        anyhow::Ok((user, aggregate))
    })?;

    let name = user.map_or_else(|| args.user.to_string(), |user| user.username);
    write_summary(writer, &name, aggregate.as_ref(), &chrono::Local)
}

fn write_summary<W, Tz>(
    writer: &mut W,
    name: &str,
    aggregate: Option<&TimeSpent>,
    tz: &Tz,
) -> Result<()>
where
    W: Write,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    match aggregate {
        Some(aggregate) => writeln!(writer, "{}", aggregate.summary(name, tz))?,
        None => writeln!(writer, "{name} has no voice time recorded in this guild.")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{FixedOffset, Utc};

    #[test]
    fn summary_uses_the_given_offset() {
        let mut aggregate = TimeSpent::empty(UserId::new_v4(), GuildId::new(42));
        aggregate.display = "1 hour and 5 minutes".to_string();
        aggregate.last_active_at = Some(Utc.with_ymd_and_hms(2025, 3, 10, 23, 30, 0).unwrap());
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();

        let mut output = Vec::new();
        write_summary(&mut output, "alice", Some(&aggregate), &tz).unwrap();

        insta::assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        alice has spent 1 hour and 5 minutes in voice channels.

        Last active: 2025-03-11 01:30
        ");
    }

    #[test]
    fn missing_aggregate_is_reported() {
        let mut output = Vec::new();
        write_summary(&mut output, "bob", None, &Utc).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "bob has no voice time recorded in this guild.\n"
        );
    }
}
