use crate::{config::DaoConfig, extensions::indexer::VoteCast, judgment::VoteChoice, status::ProposalState};
use chrono::{DateTime, Utc};

pub const MAX_TWEET_CHARS: usize = 280;
const MAX_TITLE_CHARS: usize = 120;
const ELLIPSIS: char = '…';

/// First line of the description that carries text, without heading markers.
pub fn extract_title(description: &str) -> String {
    let title = description
        .lines()
        .map(|line| line.trim_start_matches('#').trim())
        .find(|line| !line.is_empty())
        .unwrap_or("Untitled proposal");

    truncate_chars(title, MAX_TITLE_CHARS)
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(max.saturating_sub(1)).collect();
    truncated = truncated.trim_end().to_string();
    truncated.push(ELLIPSIS);
    truncated
}

/// Joins the body and an optional trailing link, shortening the body so the link survives.
fn fit(body: &str, link: Option<String>) -> String {
    match link {
        Some(link) => {
            let budget = MAX_TWEET_CHARS.saturating_sub(link.chars().count() + 2);
            format!("{}\n\n{}", truncate_chars(body, budget), link)
        }
        None => truncate_chars(body, MAX_TWEET_CHARS),
    }
}

pub fn poll_announcement(dao: &DaoConfig, proposal_id: &str, title: &str, window_end: DateTime<Utc>) -> String {
    let body = format!(
        "📢 New {} proposal\n\n{}\n\nVoting ends {}. Cast your view in the poll, the agent votes on chain with the result.",
        dao.name,
        title,
        window_end.format("%b %-d, %H:%M UTC")
    );
    fit(&body, dao.proposal_url(proposal_id))
}

pub fn expiring_announcement(dao: &DaoConfig, proposal_id: &str, title: &str, window_end: DateTime<Utc>) -> String {
    let body = format!(
        "📢 New {} proposal\n\n{}\n\nVoting closes soon ({}). Make sure your delegate has voted.",
        dao.name,
        title,
        window_end.format("%b %-d, %H:%M UTC")
    );
    fit(&body, dao.proposal_url(proposal_id))
}

pub fn status_reply(dao: &DaoConfig, proposal_id: &str, state: ProposalState, details: &[String]) -> String {
    let mut body = format!("{} Proposal status: {}", state.glyph(), capitalize(state.name()));
    for line in details {
        body.push('\n');
        body.push_str(line);
    }
    fit(&body, dao.proposal_url(proposal_id))
}

/// Used when reply generation fails or returns nothing usable.
pub fn vote_reply_fallback(dao: &DaoConfig, vote: &VoteCast) -> String {
    let choice = VoteChoice::from_support(vote.support)
        .map(VoteChoice::label)
        .unwrap_or("an unknown option");
    let mut body = format!("🗳️ {} voted {} with {} votes", short_address(&vote.voter), choice, vote.weight);
    if let Some(reason) = vote.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        body.push_str(&format!("\n\n\"{reason}\""));
    }
    fit(&body, Some(dao.transaction_url(&vote.transaction_hash)))
}

pub fn fulfillment_reply(dao: &DaoConfig, choice: VoteChoice, reasoning_lite: &str, transaction_hash: &str) -> String {
    let body = format!("🤖 The agent voted {} on chain.\n\n{}", choice.label(), reasoning_lite);
    fit(&body, Some(dao.transaction_url(transaction_hash)))
}

pub fn short_address(address: &str) -> String {
    if address.len() > 10 && address.is_ascii() {
        format!("{}…{}", &address[..6], &address[address.len() - 4..])
    } else {
        address.to_string()
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
