use crate::{
    compose::status_reply,
    extensions::twitter::{SocialPlatform, TweetDraft},
    status::{ProposalState, UnknownStatus, more_info, to_lifecycle_state},
    tasks::{AgentContext, DaoContext, Job, failure_message, proposal_discovery::pace},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use degov_db::models::{degov_tweet, sea_orm_active_enums::TweetStatus};
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingOutcome {
    Unchanged,
    /// First on-chain state seen for a fresh announcement; nothing to tell followers yet.
    Recorded(ProposalState),
    Announced(ProposalState),
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TrackingReport {
    pub unchanged: usize,
    pub recorded: usize,
    pub announced: usize,
    pub failed: usize,
}

/// Mirrors on-chain proposal state changes into replies under the announcement.
pub struct StatusTracking {
    ctx: AgentContext,
    dao: DaoContext,
}

impl StatusTracking {
    pub fn new(ctx: AgentContext, dao: DaoContext) -> Self {
        Self { ctx, dao }
    }

    #[instrument(name = "status_tracking", skip_all, fields(daocode = %self.dao.dao.code))]
    pub async fn track(&self) -> Result<TrackingReport> {
        let dao = &self.dao.dao;
        let clients = self.ctx.clients.snapshot().await;
        let social = clients.social(&dao.x_profile)?;

        let tweets = self
            .ctx
            .store
            .tweets_for_status_tracking(&dao.code)
            .await?;

        let mut report = TrackingReport::default();
        for tweet in tweets {
            match self.track_tweet(&tweet, social.as_ref()).await {
                Ok(TrackingOutcome::Unchanged) => report.unchanged += 1,
                Ok(TrackingOutcome::Recorded(_)) => report.recorded += 1,
                Ok(TrackingOutcome::Announced(_)) => report.announced += 1,
                Err(e) if e.downcast_ref::<UnknownStatus>().is_some() => {
                    return Err(e.context(format!("Governor returned an unknown status for tweet {}", tweet.id)));
                }
                Err(e) => {
                    error!(error = ?e, tweet_id = %tweet.id, proposal_id = %tweet.proposal_id, "Failed to track proposal status");
                    report.failed += 1;
                    self.ctx
                        .store
                        .record_failure(&tweet.id, &failure_message(&e))
                        .await?;
                }
            }
        }

        debug!(
            unchanged = report.unchanged,
            recorded = report.recorded,
            announced = report.announced,
            failed = report.failed,
            "Status tracking finished"
        );
        Ok(report)
    }

    async fn track_tweet(&self, tweet: &degov_tweet::Model, social: &dyn SocialPlatform) -> Result<TrackingOutcome> {
        let dao = &self.dao.dao;
        let raw = self
            .dao
            .chain
            .status(dao.governor, &tweet.proposal_id)
            .await
            .context("Failed to read proposal state")?;
        let state = to_lifecycle_state(&raw)?;

        if ProposalState::from_tweet_status(tweet.status) == Some(state) {
            return Ok(TrackingOutcome::Unchanged);
        }

        self.ctx
            .store
            .update_status(&tweet.id, state.into())
            .await?;

        if tweet.status == TweetStatus::Posted && matches!(state, ProposalState::Pending | ProposalState::Active) {
            debug!(tweet_id = %tweet.id, state = %state, "Initial proposal state recorded");
            return Ok(TrackingOutcome::Recorded(state));
        }

        let details = match more_info(state, self.ctx.indexer.as_ref(), dao, &tweet.proposal_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!(error = ?e, tweet_id = %tweet.id, state = %state, "Failed to fetch transition details");
                Vec::new()
            }
        };

        let text = status_reply(dao, &tweet.proposal_id, state, &details);
        let reply_id = social
            .send_tweet(&TweetDraft::text(text).in_reply_to(tweet.id.clone()))
            .await
            .context("Failed to publish status reply")?;

        info!(
            tweet_id = %tweet.id,
            reply_id = %reply_id,
            from = ?tweet.status,
            to = %state,
            "Proposal status change announced"
        );

        pace(self.ctx.options.tweet_delay).await;
        Ok(TrackingOutcome::Announced(state))
    }
}

#[async_trait]
impl Job for StatusTracking {
    fn name(&self) -> String {
        format!("status_tracking:{}", self.dao.dao.code)
    }

    fn interval(&self) -> Duration {
        self.ctx.options.status_interval
    }

    async fn tick(&self) -> Result<()> {
        self.track().await.map(|_| ())
    }
}
