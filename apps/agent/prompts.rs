use crate::{
    compose::{MAX_TWEET_CHARS, short_address},
    config::DaoConfig,
    extensions::indexer::VoteCast,
    judgment::{JudgmentRequest, VoteChoice},
};
use anyhow::Result;

pub fn vote_reply_system() -> String {
    format!(
        "You write short replies on X for a DAO governance account. Each reply announces one on-chain vote. \
         State the voter, their choice and voting power, and summarise their reason if one is given. \
         Stay neutral, never invent facts, use at most one emoji and stay under {} characters. \
         Reply with the tweet text only.",
        MAX_TWEET_CHARS - 40
    )
}

pub fn vote_reply_user(dao: &DaoConfig, proposal_title: &str, vote: &VoteCast) -> String {
    let choice = VoteChoice::from_support(vote.support)
        .map(VoteChoice::label)
        .unwrap_or("Unknown");
    let reason = vote
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|reason| !reason.is_empty())
        .unwrap_or("(no reason given)");

    format!(
        "DAO: {}\nProposal: {}\nVoter: {}\nChoice: {}\nVoting power: {}\nReason: {}",
        dao.name,
        proposal_title,
        short_address(&vote.voter),
        choice,
        vote.weight,
        reason
    )
}

pub fn judgment_system() -> String {
    "You decide how a DAO governance agent votes on a proposal. You receive three sources of \
     community signal: the result of an X poll, the replies under the announcement, and the votes \
     already cast on chain with their weight and reasons. Weigh all three, discount spam and \
     low-effort replies, and prefer Abstain when the signals are weak or conflicting. Report the \
     share of For/Against/Abstain you observed in each source as percentages, a confidence score \
     between 0 and 10, a full reasoning and a one or two sentence reasoningLite suitable as an \
     on-chain vote reason."
        .to_string()
}

pub fn judgment_user(dao: &DaoConfig, proposal_id: &str, description: &str, request: &JudgmentRequest) -> Result<String> {
    Ok(format!(
        "DAO: {}\nProposal id: {}\n\nProposal content:\n{}\n\nCommunity signals (JSON):\n{}",
        dao.name,
        proposal_id,
        description,
        serde_json::to_string_pretty(request)?
    ))
}
