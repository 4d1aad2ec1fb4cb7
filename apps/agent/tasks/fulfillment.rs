use crate::{
    compose::fulfillment_reply,
    extensions::{
        db_extension::StoredPoll,
        twitter::{SocialPlatform, TweetDraft},
    },
    judgment::{DECISION_SCHEMA_NAME, Decision, JudgmentRequest, VoteChoice, decision_schema, parse_decision},
    prompts::{judgment_system, judgment_user},
    tasks::{AgentContext, DaoContext, Job, failure_message, proposal_discovery::pace, tweet_sync::refresh_poll},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use degov_db::models::degov_tweet;
use serde::Serialize;
use std::time::Duration;
use tokio_retry::{Retry, strategy::FixedInterval};
use tracing::{debug, error, info, instrument, warn};
use utils::errors::POLL_NOT_FOUND_ERROR;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FulfillmentOutcome {
    Fulfilled { choice: VoteChoice, transaction_hash: String },
    /// The poll is still running.
    NotDue,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FulfillmentReport {
    pub fulfilled: usize,
    pub not_due: usize,
    pub failed: usize,
}

/// Stored in `fulfilled_explain`.
#[derive(Debug, Serialize)]
struct Explanation<'a> {
    input: &'a JudgmentRequest,
    output: &'a Decision,
    transaction_hash: &'a str,
    model: &'a str,
}

/// Turns a closed poll, its replies and the on-chain votes into the agent's own vote.
pub struct Fulfillment {
    ctx: AgentContext,
    dao: DaoContext,
}

impl Fulfillment {
    pub fn new(ctx: AgentContext, dao: DaoContext) -> Self {
        Self { ctx, dao }
    }

    #[instrument(name = "fulfillment", skip_all, fields(daocode = %self.dao.dao.code))]
    pub async fn fulfill(&self, now: DateTime<Utc>) -> Result<FulfillmentReport> {
        let dao = &self.dao.dao;
        let clients = self.ctx.clients.snapshot().await;
        let social = clients.social(&dao.x_profile)?;

        let tweets = self.ctx.store.tweets_for_fulfillment(&dao.code).await?;

        let mut report = FulfillmentReport::default();
        for tweet in tweets {
            match self.fulfill_tweet(&tweet, social.as_ref(), now).await {
                Ok(FulfillmentOutcome::Fulfilled { .. }) => report.fulfilled += 1,
                Ok(FulfillmentOutcome::NotDue) => report.not_due += 1,
                Err(e) => {
                    error!(error = ?e, tweet_id = %tweet.id, proposal_id = %tweet.proposal_id, "Fulfillment failed");
                    report.failed += 1;
                    self.ctx
                        .store
                        .record_failure(&tweet.id, &failure_message(&e))
                        .await?;
                }
            }
        }

        debug!(
            fulfilled = report.fulfilled,
            not_due = report.not_due,
            failed = report.failed,
            "Fulfillment finished"
        );
        Ok(report)
    }

    async fn fulfill_tweet(&self, tweet: &degov_tweet::Model, social: &dyn SocialPlatform, now: DateTime<Utc>) -> Result<FulfillmentOutcome> {
        let dao = &self.dao.dao;
        let store = self.ctx.store.as_ref();

        let mut poll = match store.poll_for_tweet(&tweet.id).await? {
            Some(poll) => poll,
            None => {
                debug!(tweet_id = %tweet.id, "No cached poll, forcing sync");
                refresh_poll(store, social, &tweet.id).await?;
                store
                    .poll_for_tweet(&tweet.id)
                    .await?
                    .context(POLL_NOT_FOUND_ERROR)?
            }
        };

        if !poll_has_ended(&poll, now) {
            debug!(tweet_id = %tweet.id, end = ?poll.poll.end_datetime, "Poll still running");
            return Ok(FulfillmentOutcome::NotDue);
        }

        if !poll.is_closed() {
            refresh_poll(store, social, &tweet.id).await?;
            if let Some(latest) = store.poll_for_tweet(&tweet.id).await? {
                poll = latest;
            }
        }

        let replies = store.replies_for_tweet(&tweet.id).await?;
        let votes = self
            .ctx
            .indexer
            .all_proposal_votes(&dao.indexer_endpoint, &tweet.proposal_id, self.ctx.options.vote_page_size.max(1))
            .await
            .context("Failed to query vote casts")?;
        let description = self
            .ctx
            .indexer
            .proposal(&dao.indexer_endpoint, &tweet.proposal_id)
            .await
            .context("Failed to look up proposal")?
            .map(|proposal| proposal.description)
            .unwrap_or_else(|| tweet.content.clone());

        let request = JudgmentRequest::build(&poll, &replies, &votes, social.user_id());
        let user_prompt = judgment_user(dao, &tweet.proposal_id, &description, &request)?;
        let decision = self.judge(&judgment_system(), &user_prompt).await?;

        info!(
            tweet_id = %tweet.id,
            proposal_id = %tweet.proposal_id,
            choice = decision.final_result.label(),
            confidence = decision.confidence,
            "Decision reached"
        );

        let transaction_hash = self
            .dao
            .chain
            .cast_vote_with_reason(
                dao.governor,
                &tweet.proposal_id,
                decision.final_result.support_code(),
                &decision.reasoning_lite,
            )
            .await
            .context("Failed to cast vote")?;

        let explain = serde_json::to_value(Explanation {
            input: &request,
            output: &decision,
            transaction_hash: &transaction_hash,
            model: self.ctx.ai.model(),
        })?;

        if let Err(e) = store.mark_fulfilled(&tweet.id, explain, now).await {
            error!(
                error = ?e,
                tweet_id = %tweet.id,
                transaction_hash = %transaction_hash,
                "Vote cast but fulfillment not stored"
            );
            return Err(e);
        }

        info!(
            tweet_id = %tweet.id,
            proposal_id = %tweet.proposal_id,
            transaction_hash = %transaction_hash,
            "Proposal fulfilled"
        );

        let reply = fulfillment_reply(dao, decision.final_result, &decision.reasoning_lite, &transaction_hash);
        match social
            .send_tweet(&TweetDraft::text(reply).in_reply_to(tweet.id.clone()))
            .await
        {
            Ok(reply_id) => debug!(tweet_id = %tweet.id, reply_id = %reply_id, "Fulfillment reply posted"),
            Err(e) => warn!(error = ?e, tweet_id = %tweet.id, "Failed to post fulfillment reply"),
        }
        pace(self.ctx.options.tweet_delay).await;

        Ok(FulfillmentOutcome::Fulfilled {
            choice: decision.final_result,
            transaction_hash,
        })
    }

    async fn judge(&self, system_prompt: &str, user_prompt: &str) -> Result<Decision> {
        let schema = decision_schema();
        let schema = &schema;
        let ai = self.ctx.ai.as_ref();
        let retries = self.ctx.options.ai_attempts.max(1) - 1;
        let strategy = FixedInterval::new(self.ctx.options.ai_retry_delay).take(retries);

        Retry::spawn(strategy, || async move {
            let value = ai
                .generate_structured(system_prompt, user_prompt, DECISION_SCHEMA_NAME, schema)
                .await
                .inspect_err(|e| warn!(error = %e, "Judgment attempt failed"))?;
            parse_decision(value).inspect_err(|e| warn!(error = %e, "Judgment rejected"))
        })
        .await
        .context("AI judgment failed")
    }
}

fn poll_has_ended(poll: &StoredPoll, now: DateTime<Utc>) -> bool {
    poll.is_closed()
        || poll
            .poll
            .end_datetime
            .is_some_and(|end| end.and_utc() <= now)
}

#[async_trait]
impl Job for Fulfillment {
    fn name(&self) -> String {
        format!("fulfillment:{}", self.dao.dao.code)
    }

    fn interval(&self) -> Duration {
        self.ctx.options.fulfillment_interval
    }

    async fn tick(&self) -> Result<()> {
        self.fulfill(Utc::now()).await.map(|_| ())
    }
}
