use crate::{
    extensions::{
        db_extension::TweetStore,
        twitter::{PollSnapshot, SocialPlatform},
    },
    tasks::{AgentContext, Job},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use degov_db::models::degov_tweet;
use std::time::Duration;
use tracing::{debug, error, info, instrument};

/// Poll results are read again this long before the poll closes.
const POLL_END_LEAD_MINUTES: i64 = 8;
const POLL_RECHECK_HOURS: i64 = 2;
const REPLY_MORE_PAGES_MINUTES: i64 = 5;
const REPLY_IDLE_MINUTES: i64 = 10;

pub fn next_poll_check(poll: &PollSnapshot, now: DateTime<Utc>) -> DateTime<Utc> {
    match poll.end_datetime {
        Some(end) => end - ChronoDuration::minutes(POLL_END_LEAD_MINUTES),
        None => now + ChronoDuration::hours(POLL_RECHECK_HOURS),
    }
}

pub fn next_reply_check(next_token: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    match next_token {
        Some(_) => now + ChronoDuration::minutes(REPLY_MORE_PAGES_MINUTES),
        None => now + ChronoDuration::minutes(REPLY_IDLE_MINUTES),
    }
}

/// Fetches the poll attached to a tweet and stores it when there is one.
pub async fn refresh_poll(store: &dyn TweetStore, social: &dyn SocialPlatform, tweet_id: &str) -> Result<Option<PollSnapshot>> {
    let poll = social
        .get_poll(tweet_id)
        .await
        .context("Failed to fetch poll")?;
    if let Some(poll) = &poll {
        store.save_poll(tweet_id, poll).await?;
    }
    Ok(poll)
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub polls_synced: usize,
    pub polls_stopped: usize,
    pub replies_synced: usize,
    pub failed: usize,
}

/// Keeps stored polls and reply threads current. Each tweet carries two independent schedules.
pub struct TweetSync {
    ctx: AgentContext,
}

impl TweetSync {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    #[instrument(name = "tweet_sync", skip_all)]
    pub async fn sync(&self, now: DateTime<Utc>) -> Result<SyncReport> {
        let clients = self.ctx.clients.snapshot().await;
        let mut report = SyncReport::default();

        for tweet in self.ctx.store.tweets_due_poll_sync(now).await? {
            let result = match clients.social(&tweet.profile) {
                Ok(social) => self.sync_poll(&tweet, social.as_ref(), now).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(true) => report.polls_synced += 1,
                Ok(false) => report.polls_stopped += 1,
                Err(e) => {
                    error!(error = ?e, tweet_id = %tweet.id, "Poll sync failed");
                    report.failed += 1;
                }
            }
        }

        for tweet in self.ctx.store.tweets_due_reply_sync(now).await? {
            let result = match clients.social(&tweet.profile) {
                Ok(social) => self.sync_replies(&tweet, social.as_ref(), now).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => report.replies_synced += 1,
                Err(e) => {
                    error!(error = ?e, tweet_id = %tweet.id, "Reply sync failed");
                    report.failed += 1;
                }
            }
        }

        debug!(
            polls_synced = report.polls_synced,
            polls_stopped = report.polls_stopped,
            replies_synced = report.replies_synced,
            failed = report.failed,
            "Tweet sync finished"
        );
        Ok(report)
    }

    /// Returns whether the poll schedule is still running.
    async fn sync_poll(&self, tweet: &degov_tweet::Model, social: &dyn SocialPlatform, now: DateTime<Utc>) -> Result<bool> {
        let store = self.ctx.store.as_ref();

        let Some(poll) = refresh_poll(store, social, &tweet.id).await? else {
            info!(tweet_id = %tweet.id, "Tweet has no poll, stopping poll sync");
            store.stop_poll_sync(&tweet.id).await?;
            return Ok(false);
        };

        if poll.is_closed() {
            info!(tweet_id = %tweet.id, poll_id = %poll.id, "Poll closed, stopping poll sync");
            store.stop_poll_sync(&tweet.id).await?;
            return Ok(false);
        }

        let next = next_poll_check(&poll, now);
        store.schedule_poll_sync(&tweet.id, next).await?;
        debug!(tweet_id = %tweet.id, next = %next, "Poll synced");
        Ok(true)
    }

    async fn sync_replies(&self, tweet: &degov_tweet::Model, social: &dyn SocialPlatform, now: DateTime<Utc>) -> Result<()> {
        let store = self.ctx.store.as_ref();

        if tweet.fulfilled {
            store.stop_reply_sync(&tweet.id).await?;
            return Ok(());
        }

        let page = social
            .search_replies(&tweet.id, tweet.reply_next_token.as_deref())
            .await
            .context("Failed to search replies")?;

        store.save_replies(&tweet.id, &page.replies).await?;

        let next = next_reply_check(page.next_token.as_deref(), now);
        debug!(
            tweet_id = %tweet.id,
            replies = page.replies.len(),
            has_more = page.next_token.is_some(),
            next = %next,
            "Replies synced"
        );
        store
            .schedule_reply_sync(&tweet.id, page.next_token, next)
            .await
    }
}

#[async_trait]
impl Job for TweetSync {
    fn name(&self) -> String {
        "tweet_sync".to_string()
    }

    fn interval(&self) -> Duration {
        self.ctx.options.sync_interval
    }

    async fn tick(&self) -> Result<()> {
        self.sync(Utc::now()).await.map(|_| ())
    }
}
