//! In-memory collaborators for job tests.

use crate::{
    RETRY_CEILING,
    config::{DEFAULT_OPT_OUT_MARKER, DaoConfig, JobOptions},
    duration::ClockMode,
    extensions::{
        ai::{AiClient, JudgeError},
        chain::GovernorChain,
        clients::{ClientAuthority, ClientSet},
        db_extension::{MESSAGE_SEPARATOR, NewTweet, OPEN_STATUSES, StoredPoll, TRACKED_STATUSES, TweetStore},
        indexer::{GovernanceIndexer, Proposal, TransitionEvent, VoteCast},
        twitter::{PollOptionSnapshot, PollSnapshot, PublicMetrics, ReplyPage, ReplySnapshot, SocialPlatform, TweetDraft},
    },
    status::RawStatus,
    tasks::{AgentContext, DaoContext},
};
use alloy::primitives::Address;
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use degov_db::models::{
    degov_tweet, degov_tweet_poll, degov_tweet_poll_option, degov_tweet_reply,
    sea_orm_active_enums::{TweetStatus, TweetType},
};
use serde_json::{Value, json};
use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

pub const AGENT_USER_ID: &str = "agent-1";

pub fn sample_dao() -> DaoConfig {
    DaoConfig {
        code: "ring-dao".to_string(),
        name: "RingDAO".to_string(),
        chain_id: 46,
        indexer_endpoint: "https://indexer.example.org/graphql".to_string(),
        governor: Address::ZERO,
        rpc_url: "http://localhost:8545".to_string(),
        x_profile: "degov".to_string(),
        website: Some("https://gov.example.org".to_string()),
        explorer: Some("https://explorer.example.org".to_string()),
        opt_out_marker: DEFAULT_OPT_OUT_MARKER.to_string(),
        start_block: 0,
    }
}

fn fixed_time() -> NaiveDateTime {
    DateTime::from_timestamp(1_740_000_000, 0).unwrap().naive_utc()
}

/// Timestamp-clock proposal created at `created` whose vote ends at `end`.
pub fn proposal(id: &str, block_number: u64, created: DateTime<Utc>, end: DateTime<Utc>, description: &str) -> Proposal {
    Proposal {
        proposal_id: id.to_string(),
        proposer: "0x00000000000000000000000000000000000000p1".to_string(),
        description: description.to_string(),
        vote_start: created.timestamp() as u64,
        vote_end: end.timestamp() as u64,
        block_number,
        block_timestamp: created.timestamp_millis() as u64,
        transaction_hash: format!("0xproposal{id}"),
    }
}

pub fn tweet(id: &str, proposal_id: &str, tweet_type: TweetType, status: TweetStatus) -> degov_tweet::Model {
    degov_tweet::Model {
        id: id.to_string(),
        profile: "degov".to_string(),
        daocode: "ring-dao".to_string(),
        proposal_id: proposal_id.to_string(),
        chain_id: 46,
        tweet_type,
        status,
        content: format!("📢 New RingDAO proposal\n\nProposal {proposal_id}"),
        proposal_created_at: fixed_time(),
        proposal_vote_end: fixed_time(),
        fulfilled: false,
        fulfilled_explain: None,
        fulfilled_at: None,
        times_processed: 0,
        message: None,
        reply_next_token: None,
        sync_next_time_tweet: None,
        sync_stop_tweet: tweet_type == TweetType::Text,
        sync_next_time_reply: None,
        sync_stop_reply: tweet_type == TweetType::Text,
        ctime: fixed_time(),
        utime: fixed_time(),
    }
}

pub fn vote(id: &str, voter: &str, support: u64, reason: Option<&str>) -> VoteCast {
    VoteCast {
        id: id.to_string(),
        voter: voter.to_string(),
        support,
        weight: "1000".to_string(),
        reason: reason.map(str::to_string),
        block_number: 10,
        block_timestamp: 1_740_900_000_000,
        transaction_hash: format!("0x{id}"),
    }
}

/// For/Against/Abstain poll with the given tallies.
pub fn poll_snapshot(id: &str, end: Option<DateTime<Utc>>, voting_status: &str, votes: [i64; 3]) -> PollSnapshot {
    PollSnapshot {
        id: id.to_string(),
        options: ["For", "Against", "Abstain"]
            .iter()
            .zip(votes)
            .enumerate()
            .map(|(i, (label, votes))| PollOptionSnapshot {
                position: i as i32 + 1,
                label: label.to_string(),
                votes,
            })
            .collect(),
        voting_status: Some(voting_status.to_string()),
        end_datetime: end,
        duration_minutes: Some(1440),
    }
}

pub fn reply_snapshot(id: &str, conversation_id: &str, author_id: &str, text: &str) -> ReplySnapshot {
    ReplySnapshot {
        id: id.to_string(),
        conversation_id: conversation_id.to_string(),
        author_id: author_id.to_string(),
        text: text.to_string(),
        created_at: DateTime::from_timestamp(1_740_800_000, 0).unwrap(),
        public_metrics: PublicMetrics {
            like_count: 3,
            impression_count: 40,
            ..PublicMetrics::default()
        },
    }
}

pub fn decision_json(choice: &str) -> Value {
    json!({
        "finalResult": choice,
        "confidence": 8,
        "reasoning": "The poll, the replies and the delegates lean the same way.",
        "reasoningLite": "Poll and delegates favour it.",
        "votingBreakdown": {
            "twitterPoll": { "for": 67, "against": 22, "abstain": 11 },
            "twitterComments": { "for": 100, "against": 0, "abstain": 0 },
            "onChainVotes": { "for": 100, "against": 0, "abstain": 0 }
        }
    })
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub indexer: Arc<FakeIndexer>,
    pub chain: Arc<FakeChain>,
    pub social: Arc<FakeSocial>,
    pub ai: Arc<FakeAi>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::default()),
            indexer: Arc::new(FakeIndexer::new()),
            chain: Arc::new(FakeChain::new()),
            social: Arc::new(FakeSocial::new(AGENT_USER_ID)),
            ai: Arc::new(FakeAi::default()),
        }
    }

    pub fn with_proposals(self, proposals: Vec<Proposal>) -> Self {
        self.indexer.set_proposals(proposals);
        self
    }

    pub fn agent(&self) -> AgentContext {
        AgentContext {
            store: self.store.clone(),
            indexer: self.indexer.clone(),
            ai: self.ai.clone(),
            clients: Arc::new(ClientAuthority::new(
                ClientSet::new().with_social("degov", self.social.clone()),
            )),
            options: JobOptions {
                tweet_delay: Duration::ZERO,
                ai_retry_delay: Duration::ZERO,
                vote_page_size: 2,
                ..JobOptions::default()
            },
        }
    }

    pub fn dao_context(&self) -> DaoContext {
        DaoContext {
            dao: sample_dao(),
            chain: self.chain.clone(),
        }
    }
}

#[derive(Default)]
struct StoreState {
    tweets: BTreeMap<String, degov_tweet::Model>,
    watermarks: HashMap<String, i64>,
    vote_offsets: HashMap<(String, String), i64>,
    relayed_votes: HashMap<(String, String, String), String>,
    polls: HashMap<String, StoredPoll>,
    replies: BTreeMap<String, degov_tweet_reply::Model>,
}

/// Follows the same selection and update rules as the database store.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn put(&self, tweet: degov_tweet::Model) {
        self.state.lock().unwrap().tweets.insert(tweet.id.clone(), tweet);
    }

    pub fn tweet(&self, id: &str) -> degov_tweet::Model {
        self.state.lock().unwrap().tweets.get(id).cloned().expect("tweet stored")
    }

    pub fn only_tweet(&self) -> degov_tweet::Model {
        let state = self.state.lock().unwrap();
        assert_eq!(state.tweets.len(), 1, "expected exactly one stored tweet");
        state.tweets.values().next().cloned().unwrap()
    }

    pub fn watermark(&self, daocode: &str) -> Option<i64> {
        self.state.lock().unwrap().watermarks.get(daocode).copied()
    }

    pub fn set_watermark(&self, daocode: &str, block_number: i64) {
        self.state
            .lock()
            .unwrap()
            .watermarks
            .insert(daocode.to_string(), block_number);
    }

    pub fn reset_watermark(&self, daocode: &str) {
        self.state.lock().unwrap().watermarks.remove(daocode);
    }

    pub fn vote_offset_of(&self, daocode: &str, proposal_id: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .vote_offsets
            .get(&(daocode.to_string(), proposal_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_vote_offset(&self, daocode: &str, proposal_id: &str, offset: i64) {
        self.state
            .lock()
            .unwrap()
            .vote_offsets
            .insert((daocode.to_string(), proposal_id.to_string()), offset);
    }

    pub fn put_poll(&self, tweet_id: &str, poll: PollSnapshot) {
        self.state
            .lock()
            .unwrap()
            .polls
            .insert(tweet_id.to_string(), stored_poll(tweet_id, &poll));
    }

    pub fn stored_poll(&self, tweet_id: &str) -> Option<StoredPoll> {
        self.state.lock().unwrap().polls.get(tweet_id).cloned()
    }

    pub fn put_replies(&self, tweet_id: &str, replies: Vec<ReplySnapshot>) {
        let mut state = self.state.lock().unwrap();
        for reply in &replies {
            state.replies.insert(reply.id.clone(), reply_model(tweet_id, reply));
        }
    }

    pub fn stored_replies(&self, tweet_id: &str) -> Vec<degov_tweet_reply::Model> {
        let mut replies: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .replies
            .values()
            .filter(|reply| reply.tweet_id == tweet_id)
            .cloned()
            .collect();
        replies.sort_by_key(|reply| reply.created_at);
        replies
    }

    fn select(&self, keep: impl Fn(&degov_tweet::Model) -> bool) -> Vec<degov_tweet::Model> {
        self.state
            .lock()
            .unwrap()
            .tweets
            .values()
            .filter(|tweet| keep(tweet))
            .cloned()
            .collect()
    }

    fn update(&self, tweet_id: &str, change: impl FnOnce(&mut degov_tweet::Model)) {
        if let Some(tweet) = self.state.lock().unwrap().tweets.get_mut(tweet_id) {
            change(tweet);
        }
    }
}

fn stored_poll(tweet_id: &str, poll: &PollSnapshot) -> StoredPoll {
    let now = Utc::now().naive_utc();
    let mut options: Vec<_> = poll
        .options
        .iter()
        .map(|option| degov_tweet_poll_option::Model {
            poll_id: poll.id.clone(),
            label: option.label.clone(),
            position: option.position,
            votes: option.votes,
            utime: now,
        })
        .collect();
    options.sort_by_key(|option| option.position);

    StoredPoll {
        poll: degov_tweet_poll::Model {
            id: poll.id.clone(),
            tweet_id: tweet_id.to_string(),
            end_datetime: poll.end_datetime.map(|end| end.naive_utc()),
            voting_status: poll.voting_status.clone().unwrap_or_default(),
            duration_minutes: poll.duration_minutes.and_then(|d| i32::try_from(d).ok()),
            ctime: now,
            utime: now,
        },
        options,
    }
}

fn reply_model(tweet_id: &str, reply: &ReplySnapshot) -> degov_tweet_reply::Model {
    degov_tweet_reply::Model {
        id: reply.id.clone(),
        tweet_id: tweet_id.to_string(),
        conversation_id: reply.conversation_id.clone(),
        author_id: reply.author_id.clone(),
        text: reply.text.clone(),
        like_count: reply.public_metrics.like_count,
        retweet_count: reply.public_metrics.retweet_count,
        reply_count: reply.public_metrics.reply_count,
        quote_count: reply.public_metrics.quote_count,
        impression_count: reply.public_metrics.impression_count,
        created_at: reply.created_at.naive_utc(),
        utime: Utc::now().naive_utc(),
    }
}

fn is_due(next: Option<NaiveDateTime>, now: DateTime<Utc>) -> bool {
    next.is_none_or(|next| next <= now.naive_utc())
}

#[async_trait]
impl TweetStore for MemoryStore {
    async fn dao_watermark(&self, daocode: &str) -> Result<Option<i64>> {
        Ok(self.watermark(daocode))
    }

    async fn advance_watermark(&self, daocode: &str, block_number: i64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let entry = state.watermarks.entry(daocode.to_string()).or_insert(block_number);
        *entry = (*entry).max(block_number);
        Ok(())
    }

    async fn tweet_for_proposal(&self, daocode: &str, proposal_id: &str) -> Result<Option<degov_tweet::Model>> {
        Ok(self
            .select(|tweet| tweet.daocode == daocode && tweet.proposal_id == proposal_id)
            .into_iter()
            .next())
    }

    async fn insert_tweet(&self, tweet: NewTweet) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.tweets.contains_key(&tweet.id) {
            return Ok(());
        }
        let now = Utc::now().naive_utc();
        let is_text = tweet.tweet_type == TweetType::Text;
        state.tweets.insert(
            tweet.id.clone(),
            degov_tweet::Model {
                id: tweet.id,
                profile: tweet.profile,
                daocode: tweet.daocode,
                proposal_id: tweet.proposal_id,
                chain_id: tweet.chain_id,
                tweet_type: tweet.tweet_type,
                status: TweetStatus::Posted,
                content: tweet.content,
                proposal_created_at: tweet.proposal_created_at.naive_utc(),
                proposal_vote_end: tweet.proposal_vote_end.naive_utc(),
                fulfilled: false,
                fulfilled_explain: None,
                fulfilled_at: None,
                times_processed: 0,
                message: None,
                reply_next_token: None,
                sync_next_time_tweet: None,
                sync_stop_tweet: is_text,
                sync_next_time_reply: None,
                sync_stop_reply: is_text,
                ctime: now,
                utime: now,
            },
        );
        Ok(())
    }

    async fn tweets_for_status_tracking(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>> {
        Ok(self.select(|tweet| {
            tweet.daocode == daocode && TRACKED_STATUSES.contains(&tweet.status) && tweet.times_processed < RETRY_CEILING
        }))
    }

    async fn update_status(&self, tweet_id: &str, status: TweetStatus) -> Result<()> {
        self.update(tweet_id, |tweet| tweet.status = status);
        Ok(())
    }

    async fn tweets_due_poll_sync(&self, now: DateTime<Utc>) -> Result<Vec<degov_tweet::Model>> {
        Ok(self.select(|tweet| {
            tweet.tweet_type == TweetType::Poll
                && !tweet.sync_stop_tweet
                && tweet.status != TweetStatus::Error
                && tweet.times_processed < RETRY_CEILING
                && is_due(tweet.sync_next_time_tweet, now)
        }))
    }

    async fn tweets_due_reply_sync(&self, now: DateTime<Utc>) -> Result<Vec<degov_tweet::Model>> {
        Ok(self.select(|tweet| {
            !tweet.sync_stop_reply
                && tweet.status != TweetStatus::Error
                && tweet.times_processed < RETRY_CEILING
                && is_due(tweet.sync_next_time_reply, now)
        }))
    }

    async fn save_poll(&self, tweet_id: &str, poll: &PollSnapshot) -> Result<()> {
        self.put_poll(tweet_id, poll.clone());
        Ok(())
    }

    async fn schedule_poll_sync(&self, tweet_id: &str, next: DateTime<Utc>) -> Result<()> {
        self.update(tweet_id, |tweet| tweet.sync_next_time_tweet = Some(next.naive_utc()));
        Ok(())
    }

    async fn stop_poll_sync(&self, tweet_id: &str) -> Result<()> {
        self.update(tweet_id, |tweet| tweet.sync_stop_tweet = true);
        Ok(())
    }

    async fn save_replies(&self, tweet_id: &str, replies: &[ReplySnapshot]) -> Result<()> {
        self.put_replies(tweet_id, replies.to_vec());
        Ok(())
    }

    async fn schedule_reply_sync(&self, tweet_id: &str, next_token: Option<String>, next: DateTime<Utc>) -> Result<()> {
        self.update(tweet_id, |tweet| {
            tweet.reply_next_token = next_token;
            tweet.sync_next_time_reply = Some(next.naive_utc());
        });
        Ok(())
    }

    async fn stop_reply_sync(&self, tweet_id: &str) -> Result<()> {
        self.update(tweet_id, |tweet| tweet.sync_stop_reply = true);
        Ok(())
    }

    async fn poll_for_tweet(&self, tweet_id: &str) -> Result<Option<StoredPoll>> {
        Ok(self.stored_poll(tweet_id))
    }

    async fn replies_for_tweet(&self, tweet_id: &str) -> Result<Vec<degov_tweet_reply::Model>> {
        Ok(self.stored_replies(tweet_id))
    }

    async fn tweets_for_vote_relay(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>> {
        Ok(self.select(|tweet| {
            tweet.daocode == daocode
                && tweet.tweet_type == TweetType::Poll
                && OPEN_STATUSES.contains(&tweet.status)
                && tweet.times_processed < RETRY_CEILING
        }))
    }

    async fn vote_offset(&self, daocode: &str, proposal_id: &str) -> Result<i64> {
        Ok(self.vote_offset_of(daocode, proposal_id))
    }

    async fn advance_vote_offset(&self, daocode: &str, proposal_id: &str, _chain_id: i32, offset: i64) -> Result<()> {
        if offset > 0 {
            let mut state = self.state.lock().unwrap();
            let stored = state
                .vote_offsets
                .entry((daocode.to_string(), proposal_id.to_string()))
                .or_insert(0);
            *stored = (*stored).max(offset);
        }
        Ok(())
    }

    async fn relayed_votes(&self, daocode: &str, proposal_id: &str, vote_ids: &[String]) -> Result<HashSet<String>> {
        let state = self.state.lock().unwrap();
        Ok(vote_ids
            .iter()
            .filter(|id| state.relayed_votes.contains_key(&(daocode.to_string(), proposal_id.to_string(), id.to_string())))
            .cloned()
            .collect())
    }

    async fn record_vote_relayed(&self, daocode: &str, proposal_id: &str, vote_id: &str, reply_id: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .relayed_votes
            .entry((daocode.to_string(), proposal_id.to_string(), vote_id.to_string()))
            .or_insert_with(|| reply_id.to_string());
        Ok(())
    }

    async fn tweets_for_fulfillment(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>> {
        Ok(self.select(|tweet| {
            tweet.daocode == daocode
                && tweet.tweet_type == TweetType::Poll
                && !tweet.fulfilled
                && OPEN_STATUSES.contains(&tweet.status)
                && tweet.times_processed < RETRY_CEILING
        }))
    }

    async fn mark_fulfilled(&self, tweet_id: &str, explain: Value, fulfilled_at: DateTime<Utc>) -> Result<()> {
        self.update(tweet_id, |tweet| {
            if !tweet.fulfilled {
                tweet.fulfilled = true;
                tweet.fulfilled_explain = Some(explain);
                tweet.fulfilled_at = Some(fulfilled_at.naive_utc());
                tweet.sync_stop_reply = true;
            }
        });
        Ok(())
    }

    async fn record_failure(&self, tweet_id: &str, message: &str) -> Result<()> {
        self.update(tweet_id, |tweet| {
            tweet.times_processed += 1;
            tweet.message = Some(match tweet.message.take().filter(|m| !m.is_empty()) {
                Some(previous) => format!("{previous}{MESSAGE_SEPARATOR}{message}"),
                None => message.to_string(),
            });
            if tweet.times_processed >= RETRY_CEILING {
                tweet.status = TweetStatus::Error;
            }
        });
        Ok(())
    }
}

pub struct FakeIndexer {
    proposals: Mutex<Vec<Proposal>>,
    votes: Mutex<HashMap<String, Vec<VoteCast>>>,
    vote_queries: Mutex<HashMap<String, Vec<usize>>>,
    canceled: Mutex<HashMap<String, TransitionEvent>>,
    queued: Mutex<HashMap<String, TransitionEvent>>,
    executed: Mutex<HashMap<String, TransitionEvent>>,
    fail_votes: AtomicBool,
    fail_transitions: AtomicBool,
}

impl FakeIndexer {
    pub fn new() -> Self {
        Self {
            proposals: Mutex::new(Vec::new()),
            votes: Mutex::new(HashMap::new()),
            vote_queries: Mutex::new(HashMap::new()),
            canceled: Mutex::new(HashMap::new()),
            queued: Mutex::new(HashMap::new()),
            executed: Mutex::new(HashMap::new()),
            fail_votes: AtomicBool::new(false),
            fail_transitions: AtomicBool::new(false),
        }
    }

    pub fn with_executed(self, proposal_id: &str, event: TransitionEvent) -> Self {
        self.executed
            .lock()
            .unwrap()
            .insert(proposal_id.to_string(), event);
        self
    }

    pub fn set_proposals(&self, proposals: Vec<Proposal>) {
        *self.proposals.lock().unwrap() = proposals;
    }

    pub fn set_queued(&self, proposal_id: &str, event: TransitionEvent) {
        self.queued
            .lock()
            .unwrap()
            .insert(proposal_id.to_string(), event);
    }

    pub fn set_votes(&self, proposal_id: &str, votes: Vec<VoteCast>) {
        self.votes
            .lock()
            .unwrap()
            .insert(proposal_id.to_string(), votes);
    }

    pub fn fail_votes(&self) {
        self.fail_votes.store(true, Ordering::SeqCst);
    }

    pub fn fail_transitions(&self) {
        self.fail_transitions.store(true, Ordering::SeqCst);
    }

    /// Offsets requested for `proposal_id`, in call order.
    pub fn vote_queries(&self, proposal_id: &str) -> Vec<usize> {
        self.vote_queries
            .lock()
            .unwrap()
            .get(proposal_id)
            .cloned()
            .unwrap_or_default()
    }

    fn transition(&self, events: &Mutex<HashMap<String, TransitionEvent>>, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            bail!("indexer unavailable");
        }
        Ok(events.lock().unwrap().get(proposal_id).cloned())
    }
}

#[async_trait]
impl GovernanceIndexer for FakeIndexer {
    async fn next_proposals(&self, _endpoint: &str, since_block: i64, limit: usize) -> Result<Vec<Proposal>> {
        let mut proposals: Vec<_> = self
            .proposals
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.block_number as i64 > since_block)
            .cloned()
            .collect();
        proposals.sort_by_key(|p| p.block_number);
        proposals.truncate(limit);
        Ok(proposals)
    }

    async fn proposal(&self, _endpoint: &str, proposal_id: &str) -> Result<Option<Proposal>> {
        Ok(self
            .proposals
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.proposal_id == proposal_id)
            .cloned())
    }

    async fn proposal_votes(&self, _endpoint: &str, proposal_id: &str, offset: usize, limit: usize) -> Result<Vec<VoteCast>> {
        if self.fail_votes.load(Ordering::SeqCst) {
            bail!("indexer unavailable");
        }
        self.vote_queries
            .lock()
            .unwrap()
            .entry(proposal_id.to_string())
            .or_default()
            .push(offset);
        Ok(self
            .votes
            .lock()
            .unwrap()
            .get(proposal_id)
            .map(|votes| votes.iter().skip(offset).take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn proposal_canceled(&self, _endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        self.transition(&self.canceled, proposal_id)
    }

    async fn proposal_queued(&self, _endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        self.transition(&self.queued, proposal_id)
    }

    async fn proposal_executed(&self, _endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        self.transition(&self.executed, proposal_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastVote {
    pub proposal_id: String,
    pub support: u8,
    pub reason: String,
}

pub struct FakeChain {
    clock_mode: ClockMode,
    block_interval: f64,
    statuses: Mutex<HashMap<String, RawStatus>>,
    casts: Mutex<Vec<CastVote>>,
    fail_casts: AtomicBool,
    clock_mode_failures: AtomicUsize,
    clock_mode_calls: AtomicUsize,
    block_interval_calls: AtomicUsize,
}

impl FakeChain {
    pub fn new() -> Self {
        Self {
            clock_mode: ClockMode::Timestamp,
            block_interval: 12.0,
            statuses: Mutex::new(HashMap::new()),
            casts: Mutex::new(Vec::new()),
            fail_casts: AtomicBool::new(false),
            clock_mode_failures: AtomicUsize::new(0),
            clock_mode_calls: AtomicUsize::new(0),
            block_interval_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_clock_mode(mut self, clock_mode: ClockMode) -> Self {
        self.clock_mode = clock_mode;
        self
    }

    pub fn with_block_interval(mut self, secs: f64) -> Self {
        self.block_interval = secs;
        self
    }

    pub fn set_status(&self, proposal_id: &str, status: RawStatus) {
        self.statuses
            .lock()
            .unwrap()
            .insert(proposal_id.to_string(), status);
    }

    pub fn fail_casts(&self) {
        self.fail_casts.store(true, Ordering::SeqCst);
    }

    /// The next `times` clock mode reads fail like an unreachable RPC node.
    pub fn fail_clock_mode(&self, times: usize) {
        self.clock_mode_failures.store(times, Ordering::SeqCst);
    }

    pub fn cast_votes(&self) -> Vec<CastVote> {
        self.casts.lock().unwrap().clone()
    }

    pub fn clock_mode_calls(&self) -> usize {
        self.clock_mode_calls.load(Ordering::SeqCst)
    }

    pub fn block_interval_calls(&self) -> usize {
        self.block_interval_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GovernorChain for FakeChain {
    async fn status(&self, _governor: Address, proposal_id: &str) -> Result<RawStatus> {
        self.statuses
            .lock()
            .unwrap()
            .get(proposal_id)
            .cloned()
            .ok_or_else(|| anyhow!("state() reverted for proposal {proposal_id}"))
    }

    async fn clock_mode(&self, _governor: Address) -> Result<ClockMode> {
        self.clock_mode_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .clock_mode_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            bail!("Failed to read CLOCK_MODE: error sending request: operation timed out");
        }
        Ok(self.clock_mode)
    }

    async fn block_interval(&self) -> Result<f64> {
        self.block_interval_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.block_interval)
    }

    async fn cast_vote_with_reason(&self, _governor: Address, proposal_id: &str, support: u8, reason: &str) -> Result<String> {
        if self.fail_casts.load(Ordering::SeqCst) {
            bail!("execution reverted: GovernorAlreadyCastVote");
        }
        let mut casts = self.casts.lock().unwrap();
        casts.push(CastVote {
            proposal_id: proposal_id.to_string(),
            support,
            reason: reason.to_string(),
        });
        Ok(format!("0xvote{}", casts.len()))
    }
}

pub struct FakeSocial {
    user_id: String,
    sent: Mutex<Vec<TweetDraft>>,
    failures: Mutex<Vec<String>>,
    polls: Mutex<HashMap<String, PollSnapshot>>,
    reply_pages: Mutex<HashMap<(String, Option<String>), ReplyPage>>,
    poll_calls: AtomicUsize,
    search_calls: AtomicUsize,
}

impl FakeSocial {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
            polls: Mutex::new(HashMap::new()),
            reply_pages: Mutex::new(HashMap::new()),
            poll_calls: AtomicUsize::new(0),
            search_calls: AtomicUsize::new(0),
        }
    }

    /// Successfully sent drafts, oldest first.
    pub fn sent(&self) -> Vec<TweetDraft> {
        self.sent.lock().unwrap().clone()
    }

    /// Rejects any tweet whose text contains `needle`.
    pub fn fail_when_contains(&self, needle: &str) {
        self.failures.lock().unwrap().push(needle.to_string());
    }

    pub fn clear_failures(&self) {
        self.failures.lock().unwrap().clear();
    }

    pub fn set_poll(&self, tweet_id: &str, poll: PollSnapshot) {
        self.polls.lock().unwrap().insert(tweet_id.to_string(), poll);
    }

    pub fn set_reply_page(&self, conversation_id: &str, next_token: Option<&str>, page: ReplyPage) {
        self.reply_pages
            .lock()
            .unwrap()
            .insert((conversation_id.to_string(), next_token.map(str::to_string)), page);
    }

    pub fn poll_calls(&self) -> usize {
        self.poll_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocialPlatform for FakeSocial {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    async fn send_tweet(&self, draft: &TweetDraft) -> Result<String> {
        if self
            .failures
            .lock()
            .unwrap()
            .iter()
            .any(|needle| draft.text.contains(needle.as_str()))
        {
            bail!("X API error: status=403, body=rejected");
        }
        let mut sent = self.sent.lock().unwrap();
        sent.push(draft.clone());
        Ok(format!("tweet-{}", sent.len()))
    }

    async fn get_poll(&self, tweet_id: &str) -> Result<Option<PollSnapshot>> {
        self.poll_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.polls.lock().unwrap().get(tweet_id).cloned())
    }

    async fn search_replies(&self, conversation_id: &str, next_token: Option<&str>) -> Result<ReplyPage> {
        self.search_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .reply_pages
            .lock()
            .unwrap()
            .get(&(conversation_id.to_string(), next_token.map(str::to_string)))
            .cloned()
            .unwrap_or_default())
    }
}

/// Text generation echoes the user prompt; structured responses are served from a queue.
#[derive(Default)]
pub struct FakeAi {
    structured: Mutex<VecDeque<Result<Value, JudgeError>>>,
    structured_calls: AtomicUsize,
    fail_text: AtomicBool,
}

impl FakeAi {
    pub fn push_structured(&self, response: Result<Value, JudgeError>) {
        self.structured.lock().unwrap().push_back(response);
    }

    pub fn structured_calls(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    pub fn fail_text(&self) {
        self.fail_text.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl AiClient for FakeAi {
    fn model(&self) -> &str {
        "fake-model"
    }

    async fn generate_text(&self, _system_prompt: &str, user_prompt: &str) -> Result<String, JudgeError> {
        if self.fail_text.load(Ordering::SeqCst) {
            return Err(JudgeError::Request("model unavailable".to_string()));
        }
        Ok(user_prompt.to_string())
    }

    async fn generate_structured(&self, _system_prompt: &str, _user_prompt: &str, _schema_name: &str, _schema: &Value) -> Result<Value, JudgeError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        self.structured
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(JudgeError::Request("no response queued".to_string())))
    }
}
