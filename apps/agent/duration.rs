//! Poll duration policy.
//!
//! A poll must close before the proposal's voting window does, leaving the fulfillment job
//! enough time to cast the on-chain vote. The tiers below decide how much of the window is
//! held back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MIN_POLL_MINUTES: i64 = 10;
/// Hard maximum the platform accepts for a poll (7 days).
pub const MAX_POLL_MINUTES: i64 = 7 * DAY_MINUTES;

const HOUR_MINUTES: i64 = 60;
const DAY_MINUTES: i64 = 24 * HOUR_MINUTES;
const MS_PER_MINUTE: i64 = 60_000;

/// How a governor measures its voting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockMode {
    Timestamp,
    BlockNumber,
}

#[derive(Debug, Clone, Copy)]
pub struct VotingWindow {
    pub vote_start: u64,
    pub vote_end: u64,
    pub created_block: u64,
    pub created_timestamp_ms: i64,
    pub clock_mode: ClockMode,
    /// Average seconds per block; only read in `BlockNumber` mode.
    pub block_interval_secs: f64,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("voting window point {0} cannot be represented as a timestamp")]
pub struct WindowOutOfRange(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollDuration {
    /// Negative: the window closed that many minutes ago.
    /// `None`: too little time left for a poll.
    pub duration_minutes: Option<i64>,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
}

/// What the discovery job should publish for a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Announcement {
    Expired { minutes_ago: i64 },
    Plain,
    Poll { duration_minutes: i64 },
}

impl PollDuration {
    pub fn announcement(&self) -> Announcement {
        match self.duration_minutes {
            Some(minutes) if minutes < 0 => Announcement::Expired {
                minutes_ago: -minutes,
            },
            Some(minutes) => Announcement::Poll {
                duration_minutes: minutes,
            },
            None => Announcement::Plain,
        }
    }
}

pub fn compute_duration(window: &VotingWindow, now: DateTime<Utc>) -> Result<PollDuration, WindowOutOfRange> {
    let window_start = resolve_point(window, window.vote_start)?;
    let window_end = resolve_point(window, window.vote_end)?;

    let now_ms = now.timestamp_millis();
    let end_ms = window_end.timestamp_millis();

    let duration_minutes = if end_ms < now_ms {
        let overdue_ms = now_ms - end_ms;
        Some(-((overdue_ms + MS_PER_MINUTE - 1) / MS_PER_MINUTE))
    } else {
        poll_minutes((end_ms - now_ms) / MS_PER_MINUTE)
    };

    Ok(PollDuration {
        duration_minutes,
        window_start,
        window_end,
    })
}

/// Poll length for a window that closes `remaining` minutes from now.
pub fn poll_minutes(remaining: i64) -> Option<i64> {
    if remaining < MIN_POLL_MINUTES {
        return None;
    }
    if remaining >= MAX_POLL_MINUTES + DAY_MINUTES {
        return Some(MAX_POLL_MINUTES);
    }
    if remaining > MAX_POLL_MINUTES {
        return Some((remaining - DAY_MINUTES).max(MIN_POLL_MINUTES));
    }

    let buffer = if remaining >= 5 * DAY_MINUTES {
        DAY_MINUTES
    } else if remaining >= 3 * DAY_MINUTES {
        18 * HOUR_MINUTES
    } else {
        6 * HOUR_MINUTES
    };

    Some((remaining - buffer).max(MIN_POLL_MINUTES))
}

fn resolve_point(window: &VotingWindow, point: u64) -> Result<DateTime<Utc>, WindowOutOfRange> {
    let resolved = match window.clock_mode {
        ClockMode::Timestamp => i64::try_from(point)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        ClockMode::BlockNumber => {
            let blocks = point as f64 - window.created_block as f64;
            let offset_ms = (blocks * window.block_interval_secs * 1000.0).round();
            if offset_ms.is_finite() && offset_ms.abs() < i64::MAX as f64 / 2.0 {
                window
                    .created_timestamp_ms
                    .checked_add(offset_ms as i64)
                    .and_then(DateTime::from_timestamp_millis)
            } else {
                None
            }
        }
    };
    resolved.ok_or(WindowOutOfRange(point))
}
