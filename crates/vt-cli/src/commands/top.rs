//! Guild leaderboard.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use vt_core::{GuildId, Store, TimeSpent, UserId};

use crate::Config;
use crate::store::AnyStore;

#[derive(Debug, Args)]
pub struct TopArgs {
    /// Guild snowflake.
    #[arg(long)]
    pub guild: u64,

    /// Number of entries to show.
    #[arg(long, default_value_t = vt_api::TOP_TEN)]
    pub limit: usize,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
struct Entry<'a> {
    rank: usize,
    user_id: UserId,
    username: &'a str,
    total_minutes: i64,
    display: &'a str,
}

pub fn run<W: Write>(writer: &mut W, args: &TopArgs, config: &Config) -> Result<()> {
    let store = AnyStore::open(config)?;
    let guild_id = GuildId::new(args.guild);

    let runtime = tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")?;
    let (top, names) = runtime.block_on(async {
        let top = store
            .leaderboard(guild_id, args.limit)
            .await
            .context("failed to load leaderboard")?;
        let names: HashMap<UserId, String> = store
            .list_users()
            .await
            .context("failed to list users")?
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect();
        anyhow::Ok((top, names))
    })?;

    write_leaderboard(writer, guild_id, &top, &names, args.json)
}

fn write_leaderboard<W: Write>(
    writer: &mut W,
    guild_id: GuildId,
    top: &[TimeSpent],
    names: &HashMap<UserId, String>,
    json: bool,
) -> Result<()> {
    let entries: Vec<Entry<'_>> = top
        .iter()
        .enumerate()
        .map(|(idx, aggregate)| Entry {
            rank: idx + 1,
            user_id: aggregate.user_id,
            username: names
                .get(&aggregate.user_id)
                .map_or("unknown", String::as_str),
            total_minutes: aggregate.total_minutes,
            display: &aggregate.display,
        })
        .collect();

    if json {
        serde_json::to_writer_pretty(&mut *writer, &entries)?;
        writeln!(writer)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "No voice time recorded in guild {guild_id}.")?;
        return Ok(());
    }
    writeln!(writer, "Top voice time in guild {guild_id}:")?;
    for entry in entries {
        writeln!(
            writer,
            "{:>2}. {} - {}",
            entry.rank, entry.username, entry.display
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use uuid::Uuid;

    fn aggregate(user: u128, minutes: i64, display: &str) -> TimeSpent {
        let mut aggregate = TimeSpent::empty(UserId::from_uuid(Uuid::from_u128(user)), GuildId::new(42));
        aggregate.total_minutes = minutes;
        aggregate.display = display.to_string();
        aggregate
    }

    fn names() -> HashMap<UserId, String> {
        HashMap::from([(
            UserId::from_uuid(Uuid::from_u128(1)),
            "alice".to_string(),
        )])
    }

    #[test]
    fn text_output_ranks_entries() {
        let top = vec![
            aggregate(1, 135, "2 hours and 15 minutes"),
            aggregate(2, 1, "1 minute"),
        ];
        let mut output = Vec::new();
        write_leaderboard(&mut output, GuildId::new(42), &top, &names(), false).unwrap();

        insta::assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Top voice time in guild 42:
         1. alice - 2 hours and 15 minutes
         2. unknown - 1 minute
        ");
    }

    #[test]
    fn json_output_includes_user_ids() {
        let top = vec![aggregate(1, 50, "50 minutes")];
        let mut output = Vec::new();
        write_leaderboard(&mut output, GuildId::new(42), &top, &names(), true).unwrap();

        insta::assert_snapshot!(String::from_utf8(output).unwrap(), @r#"
        [
          {
            "rank": 1,
            "user_id": "00000000-0000-0000-0000-000000000001",
            "username": "alice",
            "total_minutes": 50,
            "display": "50 minutes"
          }
        ]
        "#);
    }

    #[test]
    fn empty_guild_says_so() {
        let mut output = Vec::new();
        write_leaderboard(&mut output, GuildId::new(42), &[], &names(), false).unwrap();
        assert_eq!(
            String::from_utf8(output).unwrap(),
            "No voice time recorded in guild 42.\n"
        );
    }
}
