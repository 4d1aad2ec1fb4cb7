//! Judgment request assembled for the AI, and the decision it must return.

use crate::extensions::{ai::JudgeError, db_extension::StoredPoll, indexer::VoteCast};
use chrono::{DateTime, Utc};
use degov_db::models::degov_tweet_reply;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const DECISION_SCHEMA_NAME: &str = "governance_decision";
const MAX_CONFIDENCE: f64 = 10.0;
const MAX_PERCENTAGE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteChoice {
    For,
    Against,
    Abstain,
}

impl VoteChoice {
    /// Poll options, in the order they are attached to an announcement.
    pub const POLL_OPTIONS: [VoteChoice; 3] = [VoteChoice::For, VoteChoice::Against, VoteChoice::Abstain];

    pub fn label(self) -> &'static str {
        match self {
            VoteChoice::For => "For",
            VoteChoice::Against => "Against",
            VoteChoice::Abstain => "Abstain",
        }
    }

    /// `support` argument of `castVoteWithReason` (GovernorCountingSimple).
    pub fn support_code(self) -> u8 {
        match self {
            VoteChoice::Against => 0,
            VoteChoice::For => 1,
            VoteChoice::Abstain => 2,
        }
    }

    pub fn from_support(code: u64) -> Option<Self> {
        match code {
            0 => Some(VoteChoice::Against),
            1 => Some(VoteChoice::For),
            2 => Some(VoteChoice::Abstain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    #[serde(rename = "for")]
    pub for_votes: f64,
    pub against: f64,
    pub abstain: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotingBreakdown {
    pub twitter_poll: Breakdown,
    pub twitter_comments: Breakdown,
    pub on_chain_votes: Breakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub final_result: VoteChoice,
    pub confidence: f64,
    pub reasoning: String,
    pub reasoning_lite: String,
    pub voting_breakdown: VotingBreakdown,
}

fn breakdown_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "for": { "type": "number", "minimum": 0, "maximum": 100 },
            "against": { "type": "number", "minimum": 0, "maximum": 100 },
            "abstain": { "type": "number", "minimum": 0, "maximum": 100 }
        },
        "required": ["for", "against", "abstain"],
        "additionalProperties": false
    })
}

pub fn decision_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "finalResult": { "type": "string", "enum": ["For", "Against", "Abstain"] },
            "confidence": { "type": "number", "minimum": 0, "maximum": 10 },
            "reasoning": { "type": "string" },
            "reasoningLite": { "type": "string" },
            "votingBreakdown": {
                "type": "object",
                "properties": {
                    "twitterPoll": breakdown_schema(),
                    "twitterComments": breakdown_schema(),
                    "onChainVotes": breakdown_schema()
                },
                "required": ["twitterPoll", "twitterComments", "onChainVotes"],
                "additionalProperties": false
            }
        },
        "required": ["finalResult", "confidence", "reasoning", "reasoningLite", "votingBreakdown"],
        "additionalProperties": false
    })
}

pub fn parse_decision(value: Value) -> Result<Decision, JudgeError> {
    let decision: Decision = serde_json::from_value(value).map_err(|e| JudgeError::SchemaValidation(e.to_string()))?;

    if !(0.0..=MAX_CONFIDENCE).contains(&decision.confidence) {
        return Err(JudgeError::SchemaValidation(format!(
            "confidence {} outside 0-10",
            decision.confidence
        )));
    }

    let breakdowns = [
        ("twitterPoll", decision.voting_breakdown.twitter_poll),
        ("twitterComments", decision.voting_breakdown.twitter_comments),
        ("onChainVotes", decision.voting_breakdown.on_chain_votes),
    ];
    for (name, breakdown) in breakdowns {
        for value in [breakdown.for_votes, breakdown.against, breakdown.abstain] {
            if !(0.0..=MAX_PERCENTAGE).contains(&value) {
                return Err(JudgeError::SchemaValidation(format!(
                    "{name} percentage {value} outside 0-100"
                )));
            }
        }
    }

    if decision.reasoning_lite.trim().is_empty() {
        return Err(JudgeError::SchemaValidation("reasoningLite is empty".to_string()));
    }

    Ok(decision)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollTally {
    pub label: String,
    pub votes: i64,
    pub position: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplyEvidence {
    pub author_id: String,
    pub text: String,
    pub like_count: i64,
    pub retweet_count: i64,
    pub reply_count: i64,
    pub quote_count: i64,
    pub impression_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoteEvidence {
    pub voter: String,
    pub support: String,
    pub reason: Option<String>,
    pub weight: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Everything the AI sees when deciding how the agent votes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JudgmentRequest {
    pub poll: Vec<PollTally>,
    pub replies: Vec<ReplyEvidence>,
    pub votes: Vec<VoteEvidence>,
}

impl JudgmentRequest {
    /// Replies written by the agent itself are dropped.
    pub fn build(poll: &StoredPoll, replies: &[degov_tweet_reply::Model], votes: &[VoteCast], agent_user_id: &str) -> Self {
        let poll = poll
            .options
            .iter()
            .map(|option| PollTally {
                label: option.label.clone(),
                votes: option.votes,
                position: option.position,
            })
            .collect();

        let replies = replies
            .iter()
            .filter(|reply| reply.author_id != agent_user_id)
            .map(|reply| ReplyEvidence {
                author_id: reply.author_id.clone(),
                text: reply.text.clone(),
                like_count: reply.like_count,
                retweet_count: reply.retweet_count,
                reply_count: reply.reply_count,
                quote_count: reply.quote_count,
                impression_count: reply.impression_count,
                created_at: reply.created_at.and_utc(),
            })
            .collect();

        let votes = votes
            .iter()
            .map(|vote| VoteEvidence {
                voter: vote.voter.clone(),
                support: VoteChoice::from_support(vote.support)
                    .map(|choice| choice.label().to_string())
                    .unwrap_or_else(|| format!("Unknown({})", vote.support)),
                reason: vote.reason.clone().filter(|reason| !reason.trim().is_empty()),
                weight: vote.weight.clone(),
                timestamp: i64::try_from(vote.block_timestamp)
                    .ok()
                    .and_then(DateTime::from_timestamp_millis),
            })
            .collect();

        Self { poll, replies, votes }
    }
}
