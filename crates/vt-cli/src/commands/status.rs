//! Status command for summarizing the local store.

use std::io::Write;

use anyhow::{Context, Result};

use crate::Config;
use crate::store::open_database;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let counts = db.counts().context("failed to count rows")?;
    let last_event = db.last_event_at().context("failed to read last event")?;

    writeln!(writer, "Voice time status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Users: {}", counts.users)?;
    writeln!(writer, "Events: {}", counts.events)?;
    writeln!(writer, "All-time totals: {}", counts.time_spent)?;
    writeln!(writer, "Monthly totals: {}", counts.month_time_spent)?;
    match last_event {
        Some(at) => writeln!(writer, "Last event: {}", at.format("%Y-%m-%d %H:%M:%S UTC"))?,
        None => writeln!(writer, "No events recorded.")?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use vt_core::{ActivityAction, Event, EventId, GuildId, TransactionId, User, UserId};
    use vt_db::Database;

    use insta::assert_snapshot;

    #[test]
    fn status_command_outputs_counts_and_last_event() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("vt.db");
        let mut db = Database::open(&db_path).unwrap();

        let alice = User {
            id: UserId::new_v4(),
            discord_id: 11,
            username: "alice".to_string(),
        };
        let tx = TransactionId::new_v4();
        let event = |action, minute| Event {
            id: EventId::new_v4(),
            user_id: alice.id,
            guild_id: GuildId::new(42),
            action,
            created: Utc.with_ymd_and_hms(2025, 1, 1, 0, minute, 0).unwrap(),
            transaction_id: tx,
        };
        db.upsert_users(&[alice.clone()]).unwrap();
        db.insert_events(&[
            event(ActivityAction::Joined, 0),
            event(ActivityAction::Left, 2),
        ])
        .unwrap();
        drop(db);

        let config = Config {
            database_path: db_path.clone(),
            ..Config::default()
        };
        let mut output = Vec::new();
        run(&mut output, &config).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/vt.db");
        assert_snapshot!(output, @r"
        Voice time status
        Database: [TEMP]/vt.db
        Users: 1
        Events: 2
        All-time totals: 0
        Monthly totals: 0
        Last event: 2025-01-01 00:02:00 UTC
        ");
    }

    #[test]
    fn status_on_empty_database() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("nested").join("vt.db"),
            ..Config::default()
        };
        let mut output = Vec::new();
        run(&mut output, &config).unwrap();

        assert!(String::from_utf8(output).unwrap().ends_with("No events recorded.\n"));
    }
}
