use crate::{
    compose::{expiring_announcement, extract_title, poll_announcement},
    duration::{Announcement, VotingWindow, compute_duration},
    extensions::{
        chain::ChainMetaCache,
        db_extension::NewTweet,
        indexer::Proposal,
        twitter::{PollDraft, SocialPlatform, TweetDraft},
    },
    judgment::VoteChoice,
    tasks::{AgentContext, DaoContext, Job},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use degov_db::models::sea_orm_active_enums::TweetType;
use std::{sync::Arc, time::Duration};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Published(TweetType),
    AlreadyPublished,
    Expired,
    OptedOut,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub published: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Announces new proposals of one DAO, as a poll when there is time for one.
pub struct ProposalDiscovery {
    ctx: AgentContext,
    dao: DaoContext,
    chain_meta: Arc<ChainMetaCache>,
}

impl ProposalDiscovery {
    pub fn new(ctx: AgentContext, dao: DaoContext, chain_meta: Arc<ChainMetaCache>) -> Self {
        Self { ctx, dao, chain_meta }
    }

    #[instrument(name = "proposal_discovery", skip_all, fields(daocode = %self.dao.dao.code))]
    pub async fn discover(&self, now: DateTime<Utc>) -> Result<DiscoveryReport> {
        let dao = &self.dao.dao;
        let clients = self.ctx.clients.snapshot().await;
        let social = clients.social(&dao.x_profile)?;

        let watermark = self
            .ctx
            .store
            .dao_watermark(&dao.code)
            .await?
            .unwrap_or(dao.start_block);

        let proposals = self
            .ctx
            .indexer
            .next_proposals(&dao.indexer_endpoint, watermark, self.ctx.options.discovery_page_size)
            .await
            .context("Failed to query next proposals")?;

        let mut report = DiscoveryReport::default();
        if proposals.is_empty() {
            debug!(watermark = watermark, "No new proposals");
            return Ok(report);
        }

        info!(watermark = watermark, count = proposals.len(), "Processing new proposals");

        // The watermark only moves through proposals that were fully handled, so a failed one
        // is picked up again next tick.
        let mut contiguous = true;
        for proposal in proposals {
            let block_number = i64::try_from(proposal.block_number).context("Proposal block number out of range")?;

            match self.handle_proposal(&proposal, social.as_ref(), now).await {
                Ok(outcome) => {
                    match outcome {
                        DiscoveryOutcome::Published(_) => report.published += 1,
                        _ => report.skipped += 1,
                    }
                    if contiguous {
                        self.ctx
                            .store
                            .advance_watermark(&dao.code, block_number)
                            .await?;
                    }
                }
                Err(e) => {
                    error!(
                        error = ?e,
                        proposal_id = %proposal.proposal_id,
                        block_number = block_number,
                        "Failed to process proposal"
                    );
                    report.failed += 1;
                    contiguous = false;
                }
            }
        }

        info!(
            published = report.published,
            skipped = report.skipped,
            failed = report.failed,
            "Proposal discovery finished"
        );
        Ok(report)
    }

    async fn handle_proposal(&self, proposal: &Proposal, social: &dyn SocialPlatform, now: DateTime<Utc>) -> Result<DiscoveryOutcome> {
        let dao = &self.dao.dao;

        if self
            .ctx
            .store
            .tweet_for_proposal(&dao.code, &proposal.proposal_id)
            .await?
            .is_some()
        {
            debug!(proposal_id = %proposal.proposal_id, "Proposal already announced");
            return Ok(DiscoveryOutcome::AlreadyPublished);
        }

        let meta = self
            .chain_meta
            .resolve(self.dao.chain.as_ref(), dao.chain_id, dao.governor)
            .await
            .context("Failed to resolve clock mode")?;

        let window = VotingWindow {
            vote_start: proposal.vote_start,
            vote_end: proposal.vote_end,
            created_block: proposal.block_number,
            created_timestamp_ms: i64::try_from(proposal.block_timestamp).context("Proposal timestamp out of range")?,
            clock_mode: meta.clock_mode,
            block_interval_secs: meta.block_interval_secs,
        };
        let duration = compute_duration(&window, now)?;

        let announcement = duration.announcement();
        if let Announcement::Expired { minutes_ago } = announcement {
            info!(proposal_id = %proposal.proposal_id, minutes_ago = minutes_ago, "Voting already closed, not announcing");
            return Ok(DiscoveryOutcome::Expired);
        }

        if dao.is_opted_out(&proposal.description) {
            info!(proposal_id = %proposal.proposal_id, "Proposal opted out of announcements");
            return Ok(DiscoveryOutcome::OptedOut);
        }

        let title = extract_title(&proposal.description);
        let (draft, tweet_type) = match announcement {
            Announcement::Poll { duration_minutes } => (
                TweetDraft::text(poll_announcement(dao, &proposal.proposal_id, &title, duration.window_end)).with_poll(PollDraft {
                    options: VoteChoice::POLL_OPTIONS
                        .iter()
                        .map(|choice| choice.label().to_string())
                        .collect(),
                    duration_minutes,
                }),
                TweetType::Poll,
            ),
            _ => (
                TweetDraft::text(expiring_announcement(dao, &proposal.proposal_id, &title, duration.window_end)),
                TweetType::Text,
            ),
        };

        let tweet_id = social
            .send_tweet(&draft)
            .await
            .context("Failed to publish announcement")?;

        let created_at = DateTime::from_timestamp_millis(window.created_timestamp_ms).unwrap_or(now);
        if let Err(e) = self
            .ctx
            .store
            .insert_tweet(NewTweet {
                id: tweet_id.clone(),
                profile: dao.x_profile.clone(),
                daocode: dao.code.clone(),
                proposal_id: proposal.proposal_id.clone(),
                chain_id: dao.chain_id,
                tweet_type,
                content: draft.text.clone(),
                proposal_created_at: created_at,
                proposal_vote_end: duration.window_end,
            })
            .await
        {
            warn!(
                error = ?e,
                tweet_id = %tweet_id,
                proposal_id = %proposal.proposal_id,
                "Announcement sent but not stored, next tick will post it again"
            );
            return Err(e);
        }

        info!(
            tweet_id = %tweet_id,
            proposal_id = %proposal.proposal_id,
            tweet_type = ?tweet_type,
            poll_minutes = ?draft.poll.as_ref().map(|p| p.duration_minutes),
            "Proposal announced"
        );

        pace(self.ctx.options.tweet_delay).await;
        Ok(DiscoveryOutcome::Published(tweet_type))
    }
}

pub(crate) async fn pace(delay: Duration) {
    if !delay.is_zero() {
        sleep(delay).await;
    }
}

#[async_trait]
impl Job for ProposalDiscovery {
    fn name(&self) -> String {
        format!("proposal_discovery:{}", self.dao.dao.code)
    }

    fn interval(&self) -> Duration {
        self.ctx.options.discovery_interval
    }

    async fn tick(&self) -> Result<()> {
        self.discover(Utc::now()).await.map(|_| ())
    }
}
