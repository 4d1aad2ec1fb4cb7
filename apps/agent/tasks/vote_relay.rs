use crate::{
    compose::{MAX_TWEET_CHARS, extract_title, truncate_chars, vote_reply_fallback},
    extensions::{
        indexer::VoteCast,
        twitter::{SocialPlatform, TweetDraft},
    },
    prompts::{vote_reply_system, vote_reply_user},
    tasks::{AgentContext, DaoContext, Job, failure_message, proposal_discovery::pace},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use degov_db::models::degov_tweet;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TweetRelay {
    pub relayed: usize,
    pub skipped: usize,
    pub already_relayed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RelayReport {
    pub relayed: usize,
    pub skipped: usize,
    pub failed_tweets: usize,
}

/// Replies under each poll announcement with one tweet per on-chain vote.
///
/// Every reply is recorded against its vote id, and votes that already have one are never
/// replied to again. The stored offset only moves up to the first vote without a reply, so a
/// vote whose reply fails is picked up again by the next run.
pub struct VoteRelay {
    ctx: AgentContext,
    dao: DaoContext,
}

impl VoteRelay {
    pub fn new(ctx: AgentContext, dao: DaoContext) -> Self {
        Self { ctx, dao }
    }

    #[instrument(name = "vote_relay", skip_all, fields(daocode = %self.dao.dao.code))]
    pub async fn relay(&self) -> Result<RelayReport> {
        let dao = &self.dao.dao;
        let clients = self.ctx.clients.snapshot().await;
        let social = clients.social(&dao.x_profile)?;

        let tweets = self.ctx.store.tweets_for_vote_relay(&dao.code).await?;

        let mut report = RelayReport::default();
        for tweet in tweets {
            match self.relay_tweet(&tweet, social.as_ref()).await {
                Ok(outcome) => {
                    report.relayed += outcome.relayed;
                    report.skipped += outcome.skipped;
                }
                Err(e) => {
                    error!(error = ?e, tweet_id = %tweet.id, proposal_id = %tweet.proposal_id, "Vote relay failed");
                    report.failed_tweets += 1;
                    self.ctx
                        .store
                        .record_failure(&tweet.id, &failure_message(&e))
                        .await?;
                }
            }
        }

        debug!(
            relayed = report.relayed,
            skipped = report.skipped,
            failed_tweets = report.failed_tweets,
            "Vote relay finished"
        );
        Ok(report)
    }

    async fn relay_tweet(&self, tweet: &degov_tweet::Model, social: &dyn SocialPlatform) -> Result<TweetRelay> {
        let dao = &self.dao.dao;
        let page_size = self.ctx.options.vote_page_size.max(1);

        let offset = self
            .ctx
            .store
            .vote_offset(&dao.code, &tweet.proposal_id)
            .await?;
        let mut cursor = usize::try_from(offset).context("Stored vote offset is negative")?;
        // position of the first vote still without a reply
        let mut settled = cursor;
        let mut gap = false;

        let mut title: Option<String> = None;
        let mut outcome = TweetRelay::default();

        loop {
            let votes = self
                .ctx
                .indexer
                .proposal_votes(&dao.indexer_endpoint, &tweet.proposal_id, cursor, page_size)
                .await
                .context("Failed to query vote casts")?;
            let fetched = votes.len();
            if fetched == 0 {
                break;
            }

            let vote_ids: Vec<String> = votes.iter().map(|vote| vote.id.clone()).collect();
            let already = self
                .ctx
                .store
                .relayed_votes(&dao.code, &tweet.proposal_id, &vote_ids)
                .await?;

            if title.is_none() && already.len() < fetched {
                title = Some(self.proposal_title(&tweet.proposal_id).await);
            }
            let title = title.as_deref().unwrap_or_default();

            for vote in &votes {
                let done = if already.contains(&vote.id) {
                    outcome.already_relayed += 1;
                    true
                } else {
                    let sent = self.relay_vote(tweet, title, vote, social).await;
                    pace(self.ctx.options.tweet_delay).await;
                    match sent {
                        Ok(reply_id) => {
                            self.ctx
                                .store
                                .record_vote_relayed(&dao.code, &tweet.proposal_id, &vote.id, &reply_id)
                                .await?;
                            outcome.relayed += 1;
                            info!(
                                tweet_id = %tweet.id,
                                reply_id = %reply_id,
                                vote_id = %vote.id,
                                voter = %vote.voter,
                                "Vote relayed"
                            );
                            true
                        }
                        Err(e) => {
                            outcome.skipped += 1;
                            warn!(error = ?e, tweet_id = %tweet.id, vote_id = %vote.id, "Failed to relay vote, skipping");
                            false
                        }
                    }
                };

                if !done {
                    gap = true;
                } else if !gap {
                    settled += 1;
                }
            }

            self.ctx
                .store
                .advance_vote_offset(&dao.code, &tweet.proposal_id, dao.chain_id, i64::try_from(settled)?)
                .await?;
            cursor += fetched;

            if fetched < page_size {
                break;
            }
        }

        if outcome.already_relayed > 0 {
            debug!(
                tweet_id = %tweet.id,
                already_relayed = outcome.already_relayed,
                "Skipped votes that already have a reply"
            );
        }

        Ok(outcome)
    }

    async fn proposal_title(&self, proposal_id: &str) -> String {
        let dao = &self.dao.dao;
        match self.ctx.indexer.proposal(&dao.indexer_endpoint, proposal_id).await {
            Ok(Some(proposal)) => extract_title(&proposal.description),
            Ok(None) => format!("Proposal {proposal_id}"),
            Err(e) => {
                warn!(error = ?e, proposal_id = %proposal_id, "Failed to look up proposal title");
                format!("Proposal {proposal_id}")
            }
        }
    }

    async fn relay_vote(&self, tweet: &degov_tweet::Model, title: &str, vote: &VoteCast, social: &dyn SocialPlatform) -> Result<String> {
        let dao = &self.dao.dao;
        let text = match self
            .ctx
            .ai
            .generate_text(&vote_reply_system(), &vote_reply_user(dao, title, vote))
            .await
        {
            Ok(text) if !text.trim().is_empty() => truncate_chars(text.trim(), MAX_TWEET_CHARS),
            Ok(_) => vote_reply_fallback(dao, vote),
            Err(e) => {
                warn!(error = %e, vote_id = %vote.id, "Vote reply generation failed, using template");
                vote_reply_fallback(dao, vote)
            }
        };

        social
            .send_tweet(&TweetDraft::text(text).in_reply_to(tweet.id.clone()))
            .await
            .context("Failed to publish vote reply")
    }
}

#[async_trait]
impl Job for VoteRelay {
    fn name(&self) -> String {
        format!("vote_relay:{}", self.dao.dao.code)
    }

    fn interval(&self) -> Duration {
        self.ctx.options.vote_relay_interval
    }

    async fn tick(&self) -> Result<()> {
        self.relay().await.map(|_| ())
    }
}
