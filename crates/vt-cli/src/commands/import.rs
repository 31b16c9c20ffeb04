//! Import command for loading users and events into the local `SQLite` store.

use std::collections::HashSet;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use serde::Deserialize;

use vt_core::{Event, User};
use vt_db::Database;

/// One JSONL line: `{"kind":"user",...}` or `{"kind":"event",...}`.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum ImportRecord {
    User(User),
    Event(Event),
}

/// Totals reported after an import.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub users: usize,
    pub events: usize,
    pub orphaned_events: usize,
    pub malformed_lines: usize,
}

pub fn run<R: BufRead, W: Write>(reader: R, writer: &mut W, db: &mut Database) -> Result<()> {
    let summary = import(reader, db)?;
    writeln!(
        writer,
        "Imported {} users and {} events.",
        summary.users, summary.events
    )?;
    if summary.orphaned_events > 0 {
        writeln!(
            writer,
            "Skipped {} events for unknown users.",
            summary.orphaned_events
        )?;
    }
    if summary.malformed_lines > 0 {
        writeln!(writer, "Skipped {} malformed lines.", summary.malformed_lines)?;
    }
    Ok(())
}

/// Users are written before events so a single stream can carry both.
pub fn import<R: BufRead>(reader: R, db: &mut Database) -> Result<ImportSummary> {
    let mut summary = ImportSummary::default();
    let mut users = Vec::new();
    let mut events = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", idx + 1))?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<ImportRecord>(trimmed) {
            Ok(ImportRecord::User(user)) => users.push(user),
            Ok(ImportRecord::Event(event)) => events.push(event),
            Err(err) => {
                tracing::warn!(line = idx + 1, error = %err, "skipping malformed import line");
                summary.malformed_lines += 1;
            }
        }
    }

    summary.users = db.upsert_users(&users).context("failed to store users")?;

    let known: HashSet<_> = db
        .list_users()
        .context("failed to list users")?
        .into_iter()
        .map(|user| user.id)
        .collect();
    let (events, orphaned): (Vec<_>, Vec<_>) = events
        .into_iter()
        .partition(|event| known.contains(&event.user_id));
    for event in &orphaned {
        tracing::warn!(event_id = %event.id, user_id = %event.user_id, "skipping event for unknown user");
    }
    summary.orphaned_events = orphaned.len();
    summary.events = db.insert_events(&events).context("failed to store events")?;

    Ok(summary)
}
