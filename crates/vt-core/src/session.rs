//! Voice session reconstruction.
//!
//! Rebuilds one elapsed interval per transaction from the raw join/switch/leave
//! events of a single (user, guild) pair.
//!
//! # Resolution policy
//!
//! Within a transaction the events are ordered by `created`, then:
//!
//! - `join` is the first `Joined` event
//! - `switched` is the **last** `Switched` event
//! - `left` is the first `Left` event
//!
//! A transaction with `join` and `switched` but no `left` is still open; it is
//! credited up to the last observed switch. A transaction with `join` and `left`
//! is closed. Anything else (a bare `Left`, a lone `Joined`) contributes nothing.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::action::ActivityAction;
use crate::duration::DurationAccumulator;
use crate::types::{Event, TransactionId};

/// How a reconstructed session was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Closed by a `Left` event.
    Left,
    /// Still open; ends at the most recent `Switched` event.
    LastSwitch,
}

/// The interval derived from one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub transaction_id: TransactionId,
    pub joined_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub end: SessionEnd,
}

impl Session {
    /// Raw `ended_at - joined_at`, negative when the events are out of order.
    pub fn elapsed(&self) -> Duration {
        self.ended_at.signed_duration_since(self.joined_at)
    }

    /// Elapsed time clamped to zero.
    pub fn duration(&self) -> Duration {
        self.elapsed().max(Duration::zero())
    }

    pub fn is_open(&self) -> bool {
        self.end == SessionEnd::LastSwitch
    }
}

/// Reconstructs sessions from an unordered batch of events.
///
/// Sessions are returned ordered by join time, then transaction ID.
pub fn reconstruct_sessions(events: &[Event]) -> Vec<Session> {
    let mut transactions: BTreeMap<TransactionId, Vec<&Event>> = BTreeMap::new();
    for event in events {
        transactions
            .entry(event.transaction_id)
            .or_default()
            .push(event);
    }

    let mut sessions: Vec<Session> = transactions
        .into_iter()
        .filter_map(|(transaction_id, mut group)| {
            // stable: equal timestamps keep their input order
            group.sort_by_key(|event| event.created);
            resolve_transaction(transaction_id, &group)
        })
        .collect();

    sessions.sort_by(|a, b| {
        a.joined_at
            .cmp(&b.joined_at)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });
    sessions
}

fn resolve_transaction(transaction_id: TransactionId, group: &[&Event]) -> Option<Session> {
    let join = group
        .iter()
        .find(|event| event.action == ActivityAction::Joined);
    let switched = group
        .iter()
        .rev()
        .find(|event| event.action == ActivityAction::Switched);
    let left = group
        .iter()
        .find(|event| event.action == ActivityAction::Left);

    let (join, end_event, end) = match (join, switched, left) {
        (Some(join), Some(switched), None) => (join, switched, SessionEnd::LastSwitch),
        (Some(join), _, Some(left)) => (join, left, SessionEnd::Left),
        _ => {
            tracing::trace!(%transaction_id, events = group.len(), "unresolvable transaction");
            return None;
        }
    };

    let session = Session {
        transaction_id,
        joined_at: join.created,
        ended_at: end_event.created,
        end,
    };
    if session.elapsed() < Duration::zero() {
        tracing::warn!(
            %transaction_id,
            joined_at = %session.joined_at,
            ended_at = %session.ended_at,
            "session ends before it starts; clamping to zero"
        );
    }
    Some(session)
}

/// Sums session durations into an accumulator, whole minutes per session.
pub fn accumulate(sessions: &[Session]) -> DurationAccumulator {
    let mut acc = DurationAccumulator::new();
    for session in sessions {
        acc.add_duration(session.duration());
    }
    acc
}


#[cfg(test)]
mod tests {
    use super::test_support::{at, event, tx, user};
    use super::*;

    use crate::action::ActivityAction::{Joined, Left, Switched};

    fn ev(action: ActivityAction, h: u32, m: u32, transaction: u128) -> Event {
        event(user(1), 7, action, at(2025, 3, 10, h, m), tx(transaction))
    }

    #[test]
    fn joined_then_left_yields_exact_interval() {
        let sessions = reconstruct_sessions(&[ev(Joined, 9, 0, 1), ev(Left, 10, 37, 1)]);

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].end, SessionEnd::Left);
        assert_eq!(sessions[0].duration(), Duration::minutes(97));
    }

    #[test]
    fn open_session_is_credited_to_last_switch() {
        // Known boundary: time after the last switch is not counted until a
        // Left event arrives.
        let sessions = reconstruct_sessions(&[
            ev(Joined, 9, 0, 1),
            ev(Switched, 9, 10, 1),
            ev(Switched, 9, 40, 1),
        ]);

        assert_eq!(sessions.len(), 1);
        assert!(sessions[0].is_open());
        assert_eq!(sessions[0].duration(), Duration::minutes(40));
    }

    #[test]
    fn last_switch_wins_regardless_of_input_order() {
        let sessions = reconstruct_sessions(&[
            ev(Switched, 9, 40, 1),
            ev(Joined, 9, 0, 1),
            ev(Switched, 9, 10, 1),
        ]);

        assert_eq!(sessions[0].duration(), Duration::minutes(40));
    }

    #[test]
    fn left_takes_precedence_over_switches() {
        let sessions = reconstruct_sessions(&[
            ev(Joined, 9, 0, 1),
            ev(Switched, 9, 20, 1),
            ev(Left, 9, 50, 1),
        ]);

        assert_eq!(sessions[0].end, SessionEnd::Left);
        assert_eq!(sessions[0].duration(), Duration::minutes(50));
    }

    #[test]
    fn left_without_join_is_dropped() {
        assert!(reconstruct_sessions(&[ev(Left, 9, 0, 1)]).is_empty());
    }

    #[test]
    fn lone_join_is_dropped() {
        assert!(reconstruct_sessions(&[ev(Joined, 9, 0, 1)]).is_empty());
    }

    #[test]
    fn switch_without_join_is_dropped() {
        assert!(reconstruct_sessions(&[ev(Switched, 9, 0, 1), ev(Left, 9, 30, 1)]).is_empty());
    }

    #[test]
    fn transactions_are_resolved_independently() {
        let sessions = reconstruct_sessions(&[
            ev(Joined, 12, 0, 2),
            ev(Joined, 9, 0, 1),
            ev(Left, 9, 30, 1),
            ev(Left, 12, 45, 2),
            ev(Left, 15, 0, 3),
        ]);

        let minutes: Vec<i64> = sessions.iter().map(|s| s.duration().num_minutes()).collect();
        assert_eq!(minutes, vec![30, 45]);
        assert_eq!(sessions[0].transaction_id, tx(1));
    }

    #[test]
    fn negative_interval_is_clamped_to_zero() {
        let session = Session {
            transaction_id: tx(1),
            joined_at: at(2025, 3, 10, 10, 0),
            ended_at: at(2025, 3, 10, 9, 0),
            end: SessionEnd::Left,
        };
        assert_eq!(session.elapsed(), Duration::minutes(-60));
        assert_eq!(session.duration(), Duration::zero());
        assert!(accumulate(&[session]).is_zero());
    }

    #[test]
    fn left_recorded_before_join_contributes_nothing() {
        let sessions = reconstruct_sessions(&[ev(Left, 8, 0, 1), ev(Joined, 9, 0, 1)]);
        assert_eq!(sessions.len(), 1);
        assert_eq!(accumulate(&sessions).total_minutes(), 0);
    }

    #[test]
    fn accumulate_truncates_each_session_to_whole_minutes() {
        let joined = at(2025, 3, 10, 9, 0);
        let sessions = reconstruct_sessions(&[
            event(user(1), 7, Joined, joined, tx(1)),
            event(user(1), 7, Left, joined + Duration::seconds(90), tx(1)),
            event(user(1), 7, Joined, joined, tx(2)),
            event(user(1), 7, Left, joined + Duration::seconds(150), tx(2)),
        ]);

        let acc = accumulate(&sessions);
        assert_eq!(acc.total_minutes(), 3);
    }

    #[test]
    fn multi_hour_sessions_accumulate_with_carry() {
        let sessions = reconstruct_sessions(&[
            ev(Joined, 8, 0, 1),
            ev(Left, 10, 45, 1),
            ev(Joined, 13, 0, 2),
            ev(Left, 13, 30, 2),
        ]);

        let acc = accumulate(&sessions);
        assert_eq!((acc.hours(), acc.minutes()), (3, 15));
        assert_eq!(acc.to_string(), "3 hours and 15 minutes");
    }
}
