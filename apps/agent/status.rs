//! Maps on-chain governor states to lifecycle states, and describes each transition for
//! the follow-up reply.

use crate::{config::DaoConfig, extensions::indexer::GovernanceIndexer};
use anyhow::Result;
use chrono::{DateTime, Utc};
use degov_db::models::sea_orm_active_enums::TweetStatus;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// OpenZeppelin `IGovernor.ProposalState`, in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProposalState {
    Pending,
    Active,
    Canceled,
    Defeated,
    Succeeded,
    Queued,
    Expired,
    Executed,
}

pub const ALL_STATES: [ProposalState; 8] = [
    ProposalState::Pending,
    ProposalState::Active,
    ProposalState::Canceled,
    ProposalState::Defeated,
    ProposalState::Succeeded,
    ProposalState::Queued,
    ProposalState::Expired,
    ProposalState::Executed,
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown proposal status: {0}")]
pub struct UnknownStatus(pub String);

/// A status exactly as a collaborator reported it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawStatus {
    Code(u64),
    Name(String),
}

impl fmt::Display for RawStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawStatus::Code(code) => write!(f, "{code}"),
            RawStatus::Name(name) => f.write_str(name),
        }
    }
}

impl ProposalState {
    pub fn code(self) -> u64 {
        match self {
            ProposalState::Pending => 0,
            ProposalState::Active => 1,
            ProposalState::Canceled => 2,
            ProposalState::Defeated => 3,
            ProposalState::Succeeded => 4,
            ProposalState::Queued => 5,
            ProposalState::Expired => 6,
            ProposalState::Executed => 7,
        }
    }

    pub fn from_code(code: u64) -> Result<Self, UnknownStatus> {
        usize::try_from(code)
            .ok()
            .and_then(|index| ALL_STATES.get(index))
            .copied()
            .ok_or_else(|| UnknownStatus(code.to_string()))
    }

    pub fn name(self) -> &'static str {
        match self {
            ProposalState::Pending => "pending",
            ProposalState::Active => "active",
            ProposalState::Canceled => "canceled",
            ProposalState::Defeated => "defeated",
            ProposalState::Succeeded => "succeeded",
            ProposalState::Queued => "queued",
            ProposalState::Expired => "expired",
            ProposalState::Executed => "executed",
        }
    }

    pub fn glyph(self) -> &'static str {
        match self {
            ProposalState::Pending => "⏳",
            ProposalState::Active => "🗳️",
            ProposalState::Canceled => "🚫",
            ProposalState::Defeated => "❌",
            ProposalState::Succeeded => "✅",
            ProposalState::Queued => "⏱️",
            ProposalState::Expired => "⌛",
            ProposalState::Executed => "🚀",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProposalState::Canceled | ProposalState::Defeated | ProposalState::Executed | ProposalState::Expired
        )
    }

    /// Lifecycle state a stored tweet status stands for. `Posted` and `Error` have none.
    pub fn from_tweet_status(status: TweetStatus) -> Option<Self> {
        match status {
            TweetStatus::Pending => Some(ProposalState::Pending),
            TweetStatus::Active => Some(ProposalState::Active),
            TweetStatus::Canceled => Some(ProposalState::Canceled),
            TweetStatus::Defeated => Some(ProposalState::Defeated),
            TweetStatus::Succeeded => Some(ProposalState::Succeeded),
            TweetStatus::Queued => Some(ProposalState::Queued),
            TweetStatus::Expired => Some(ProposalState::Expired),
            TweetStatus::Executed => Some(ProposalState::Executed),
            TweetStatus::Posted | TweetStatus::Error => None,
        }
    }
}

impl fmt::Display for ProposalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProposalState {
    type Err = UnknownStatus;

    /// Accepts the lowercase state names only.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATES
            .iter()
            .copied()
            .find(|state| state.name() == s)
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

impl From<ProposalState> for TweetStatus {
    fn from(state: ProposalState) -> Self {
        match state {
            ProposalState::Pending => TweetStatus::Pending,
            ProposalState::Active => TweetStatus::Active,
            ProposalState::Canceled => TweetStatus::Canceled,
            ProposalState::Defeated => TweetStatus::Defeated,
            ProposalState::Succeeded => TweetStatus::Succeeded,
            ProposalState::Queued => TweetStatus::Queued,
            ProposalState::Expired => TweetStatus::Expired,
            ProposalState::Executed => TweetStatus::Executed,
        }
    }
}

pub fn to_lifecycle_state(raw: &RawStatus) -> Result<ProposalState, UnknownStatus> {
    match raw {
        RawStatus::Code(code) => ProposalState::from_code(*code),
        RawStatus::Name(name) => name.parse(),
    }
}

/// Extra context attached to a status reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionDetail {
    Canceled { transaction_hash: Option<String> },
    Queued { transaction_hash: Option<String>, eta: Option<DateTime<Utc>> },
    Executed { transaction_hash: Option<String> },
    Other,
}

impl TransitionDetail {
    pub async fn fetch(state: ProposalState, indexer: &dyn GovernanceIndexer, endpoint: &str, proposal_id: &str) -> Result<Self> {
        let detail = match state {
            ProposalState::Canceled => TransitionDetail::Canceled {
                transaction_hash: indexer
                    .proposal_canceled(endpoint, proposal_id)
                    .await?
                    .map(|event| event.transaction_hash),
            },
            ProposalState::Queued => {
                let event = indexer.proposal_queued(endpoint, proposal_id).await?;
                TransitionDetail::Queued {
                    eta: event
                        .as_ref()
                        .and_then(|e| e.eta_seconds)
                        .and_then(|secs| i64::try_from(secs).ok())
                        .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                    transaction_hash: event.map(|e| e.transaction_hash),
                }
            }
            ProposalState::Executed => TransitionDetail::Executed {
                transaction_hash: indexer
                    .proposal_executed(endpoint, proposal_id)
                    .await?
                    .map(|event| event.transaction_hash),
            },
            _ => TransitionDetail::Other,
        };
        Ok(detail)
    }

    pub fn render(&self, dao: &DaoConfig) -> Vec<String> {
        let transaction_line = |hash: &Option<String>| {
            hash.as_ref()
                .map(|hash| format!("Tx: {}", dao.transaction_url(hash)))
        };

        match self {
            TransitionDetail::Canceled { transaction_hash } | TransitionDetail::Executed { transaction_hash } => {
                transaction_line(transaction_hash).into_iter().collect()
            }
            TransitionDetail::Queued { transaction_hash, eta } => {
                let mut lines = Vec::new();
                if let Some(eta) = eta {
                    lines.push(format!("Executable after {}", eta.format("%Y-%m-%d %H:%M UTC")));
                }
                lines.extend(transaction_line(transaction_hash));
                lines
            }
            TransitionDetail::Other => Vec::new(),
        }
    }
}

/// Annotation lines for a status reply.
pub async fn more_info(state: ProposalState, indexer: &dyn GovernanceIndexer, dao: &DaoConfig, proposal_id: &str) -> Result<Vec<String>> {
    let detail = TransitionDetail::fetch(state, indexer, &dao.indexer_endpoint, proposal_id).await?;
    Ok(detail.render(dao))
}
