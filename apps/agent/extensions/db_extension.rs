use crate::{
    RETRY_CEILING,
    extensions::twitter::{PollSnapshot, ReplySnapshot},
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use degov_db::models::{
    degov_dao_progress, degov_tweet, degov_tweet_poll, degov_tweet_poll_option, degov_tweet_reply,
    degov_vote_progress, degov_vote_relayed,
    sea_orm_active_enums::{TweetStatus, TweetType},
};
use sea_orm::{
    ActiveEnum, ColumnTrait, ConnectOptions, Database, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
    sea_query::{Expr, OnConflict},
};
use serde_json::Value;
use std::{collections::HashSet, time::Duration};
use tracing::{debug, info};
use utils::errors::{DATABASE_CONNECTION_FAILED, DATABASE_MIGRATION_FAILED, DB_TRANSACTION_BEGIN_FAILED, DB_TRANSACTION_COMMIT_FAILED};

/// Separator between chained failure messages.
pub const MESSAGE_SEPARATOR: &str = "\n========\n";

/// Statuses a tweet keeps while its proposal is still open for voting.
pub const OPEN_STATUSES: [TweetStatus; 3] = [TweetStatus::Posted, TweetStatus::Pending, TweetStatus::Active];

/// Statuses the status tracker still polls the governor for.
pub const TRACKED_STATUSES: [TweetStatus; 5] = [
    TweetStatus::Posted,
    TweetStatus::Pending,
    TweetStatus::Active,
    TweetStatus::Succeeded,
    TweetStatus::Queued,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTweet {
    pub id: String,
    pub profile: String,
    pub daocode: String,
    pub proposal_id: String,
    pub chain_id: i32,
    pub tweet_type: TweetType,
    pub content: String,
    pub proposal_created_at: DateTime<Utc>,
    pub proposal_vote_end: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPoll {
    pub poll: degov_tweet_poll::Model,
    pub options: Vec<degov_tweet_poll_option::Model>,
}

impl StoredPoll {
    pub fn is_closed(&self) -> bool {
        self.poll.voting_status == "closed"
    }
}

/// Shared coordination surface for every job. Counters and cursors are updated in place by
/// the database so concurrent jobs never overwrite each other's fields.
#[async_trait]
pub trait TweetStore: Send + Sync {
    async fn dao_watermark(&self, daocode: &str) -> Result<Option<i64>>;

    /// Moves the watermark forward; never moves it back.
    async fn advance_watermark(&self, daocode: &str, block_number: i64) -> Result<()>;

    async fn tweet_for_proposal(&self, daocode: &str, proposal_id: &str) -> Result<Option<degov_tweet::Model>>;

    /// Inserts once; a second insert with the same id is ignored.
    async fn insert_tweet(&self, tweet: NewTweet) -> Result<()>;

    async fn tweets_for_status_tracking(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>>;

    async fn update_status(&self, tweet_id: &str, status: TweetStatus) -> Result<()>;

    async fn tweets_due_poll_sync(&self, now: DateTime<Utc>) -> Result<Vec<degov_tweet::Model>>;

    async fn tweets_due_reply_sync(&self, now: DateTime<Utc>) -> Result<Vec<degov_tweet::Model>>;

    async fn save_poll(&self, tweet_id: &str, poll: &PollSnapshot) -> Result<()>;

    async fn schedule_poll_sync(&self, tweet_id: &str, next: DateTime<Utc>) -> Result<()>;

    async fn stop_poll_sync(&self, tweet_id: &str) -> Result<()>;

    async fn save_replies(&self, tweet_id: &str, replies: &[ReplySnapshot]) -> Result<()>;

    async fn schedule_reply_sync(&self, tweet_id: &str, next_token: Option<String>, next: DateTime<Utc>) -> Result<()>;

    async fn stop_reply_sync(&self, tweet_id: &str) -> Result<()>;

    async fn poll_for_tweet(&self, tweet_id: &str) -> Result<Option<StoredPoll>>;

    async fn replies_for_tweet(&self, tweet_id: &str) -> Result<Vec<degov_tweet_reply::Model>>;

    async fn tweets_for_vote_relay(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>>;

    async fn vote_offset(&self, daocode: &str, proposal_id: &str) -> Result<i64>;

    /// Moves the offset forward to `offset`, creating the row on first use. Never moves it back.
    async fn advance_vote_offset(&self, daocode: &str, proposal_id: &str, chain_id: i32, offset: i64) -> Result<()>;

    /// The subset of `vote_ids` that already has a reply.
    async fn relayed_votes(&self, daocode: &str, proposal_id: &str, vote_ids: &[String]) -> Result<HashSet<String>>;

    async fn record_vote_relayed(&self, daocode: &str, proposal_id: &str, vote_id: &str, reply_id: &str) -> Result<()>;

    async fn tweets_for_fulfillment(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>>;

    async fn mark_fulfilled(&self, tweet_id: &str, explain: Value, fulfilled_at: DateTime<Utc>) -> Result<()>;

    /// Bumps `times_processed`, appends `message` and pins the tweet to `Error` at the ceiling.
    async fn record_failure(&self, tweet_id: &str, message: &str) -> Result<()>;
}

pub async fn initialize_db(database_url: &str) -> Result<DatabaseConnection> {
    let mut opt = ConnectOptions::new(database_url.to_string());
    opt.max_connections(10)
        .min_connections(2)
        .connect_timeout(Duration::from_secs(8))
        .acquire_timeout(Duration::from_secs(8))
        .idle_timeout(Duration::from_secs(60))
        .sqlx_logging(false);

    let db = Database::connect(opt)
        .await
        .context(DATABASE_CONNECTION_FAILED)?;

    degov_db::migrate(&db)
        .await
        .context(DATABASE_MIGRATION_FAILED)?;

    info!("Database connected and migrated");
    Ok(db)
}

pub struct SeaOrmStore {
    db: DatabaseConnection,
}

impl SeaOrmStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn naive(at: DateTime<Utc>) -> sea_orm::prelude::DateTime {
    at.naive_utc()
}

fn now_expr() -> sea_orm::sea_query::SimpleExpr {
    Expr::value(Utc::now().naive_utc())
}

#[async_trait]
impl TweetStore for SeaOrmStore {
    async fn dao_watermark(&self, daocode: &str) -> Result<Option<i64>> {
        let progress = degov_dao_progress::Entity::find_by_id(daocode.to_string())
            .one(&self.db)
            .await?;
        Ok(progress.map(|p| p.last_block_number))
    }

    async fn advance_watermark(&self, daocode: &str, block_number: i64) -> Result<()> {
        let progress = degov_dao_progress::ActiveModel {
            daocode: Set(daocode.to_string()),
            last_block_number: Set(block_number),
            utime: Set(Utc::now().naive_utc()),
        };

        degov_dao_progress::Entity::insert(progress)
            .on_conflict(
                OnConflict::column(degov_dao_progress::Column::Daocode)
                    .value(
                        degov_dao_progress::Column::LastBlockNumber,
                        Expr::cust("GREATEST(degov_dao_progress.last_block_number, EXCLUDED.last_block_number)"),
                    )
                    .update_column(degov_dao_progress::Column::Utime)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn tweet_for_proposal(&self, daocode: &str, proposal_id: &str) -> Result<Option<degov_tweet::Model>> {
        Ok(degov_tweet::Entity::find()
            .filter(degov_tweet::Column::Daocode.eq(daocode))
            .filter(degov_tweet::Column::ProposalId.eq(proposal_id))
            .one(&self.db)
            .await?)
    }

    async fn insert_tweet(&self, tweet: NewTweet) -> Result<()> {
        let now = Utc::now().naive_utc();
        let is_text = tweet.tweet_type == TweetType::Text;
        let model = degov_tweet::ActiveModel {
            id: Set(tweet.id.clone()),
            profile: Set(tweet.profile),
            daocode: Set(tweet.daocode),
            proposal_id: Set(tweet.proposal_id),
            chain_id: Set(tweet.chain_id),
            tweet_type: Set(tweet.tweet_type),
            status: Set(TweetStatus::Posted),
            content: Set(tweet.content),
            proposal_created_at: Set(naive(tweet.proposal_created_at)),
            proposal_vote_end: Set(naive(tweet.proposal_vote_end)),
            fulfilled: Set(false),
            fulfilled_explain: Set(None),
            fulfilled_at: Set(None),
            times_processed: Set(0),
            message: Set(None),
            reply_next_token: Set(None),
            sync_next_time_tweet: Set(None),
            sync_stop_tweet: Set(is_text),
            sync_next_time_reply: Set(None),
            sync_stop_reply: Set(is_text),
            ctime: Set(now),
            utime: Set(now),
        };

        let inserted = degov_tweet::Entity::insert(model)
            .on_conflict(
                OnConflict::column(degov_tweet::Column::Id)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;

        debug!(tweet_id = %tweet.id, inserted = inserted, "Tweet stored");
        Ok(())
    }

    async fn tweets_for_status_tracking(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>> {
        Ok(degov_tweet::Entity::find()
            .filter(degov_tweet::Column::Daocode.eq(daocode))
            .filter(degov_tweet::Column::Status.is_in(TRACKED_STATUSES))
            .filter(degov_tweet::Column::TimesProcessed.lt(RETRY_CEILING))
            .order_by_asc(degov_tweet::Column::Ctime)
            .all(&self.db)
            .await?)
    }

    async fn update_status(&self, tweet_id: &str, status: TweetStatus) -> Result<()> {
        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::Status, Expr::value(status.into_value()))
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn tweets_due_poll_sync(&self, now: DateTime<Utc>) -> Result<Vec<degov_tweet::Model>> {
        Ok(degov_tweet::Entity::find()
            .filter(degov_tweet::Column::TweetType.eq(TweetType::Poll))
            .filter(degov_tweet::Column::SyncStopTweet.eq(false))
            .filter(degov_tweet::Column::Status.ne(TweetStatus::Error))
            .filter(degov_tweet::Column::TimesProcessed.lt(RETRY_CEILING))
            .filter(
                sea_orm::Condition::any()
                    .add(degov_tweet::Column::SyncNextTimeTweet.is_null())
                    .add(degov_tweet::Column::SyncNextTimeTweet.lte(naive(now))),
            )
            .all(&self.db)
            .await?)
    }

    async fn tweets_due_reply_sync(&self, now: DateTime<Utc>) -> Result<Vec<degov_tweet::Model>> {
        Ok(degov_tweet::Entity::find()
            .filter(degov_tweet::Column::SyncStopReply.eq(false))
            .filter(degov_tweet::Column::Status.ne(TweetStatus::Error))
            .filter(degov_tweet::Column::TimesProcessed.lt(RETRY_CEILING))
            .filter(
                sea_orm::Condition::any()
                    .add(degov_tweet::Column::SyncNextTimeReply.is_null())
                    .add(degov_tweet::Column::SyncNextTimeReply.lte(naive(now))),
            )
            .all(&self.db)
            .await?)
    }

    async fn save_poll(&self, tweet_id: &str, poll: &PollSnapshot) -> Result<()> {
        let now = Utc::now().naive_utc();
        let txn = self
            .db
            .begin()
            .await
            .context(DB_TRANSACTION_BEGIN_FAILED)?;

        let poll_model = degov_tweet_poll::ActiveModel {
            id: Set(poll.id.clone()),
            tweet_id: Set(tweet_id.to_string()),
            end_datetime: Set(poll.end_datetime.map(naive)),
            voting_status: Set(poll.voting_status.clone().unwrap_or_default()),
            duration_minutes: Set(poll.duration_minutes.and_then(|d| i32::try_from(d).ok())),
            ctime: Set(now),
            utime: Set(now),
        };

        degov_tweet_poll::Entity::insert(poll_model)
            .on_conflict(
                OnConflict::column(degov_tweet_poll::Column::Id)
                    .update_columns([
                        degov_tweet_poll::Column::EndDatetime,
                        degov_tweet_poll::Column::VotingStatus,
                        degov_tweet_poll::Column::DurationMinutes,
                        degov_tweet_poll::Column::Utime,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&txn)
            .await?;

        if !poll.options.is_empty() {
            let options = poll.options.iter().map(|option| degov_tweet_poll_option::ActiveModel {
                poll_id: Set(poll.id.clone()),
                label: Set(option.label.clone()),
                position: Set(option.position),
                votes: Set(option.votes),
                utime: Set(now),
            });

            degov_tweet_poll_option::Entity::insert_many(options)
                .on_conflict(
                    OnConflict::columns([
                        degov_tweet_poll_option::Column::PollId,
                        degov_tweet_poll_option::Column::Label,
                        degov_tweet_poll_option::Column::Position,
                    ])
                    .update_columns([degov_tweet_poll_option::Column::Votes, degov_tweet_poll_option::Column::Utime])
                    .to_owned(),
                )
                .exec_without_returning(&txn)
                .await?;
        }

        txn.commit()
            .await
            .context(DB_TRANSACTION_COMMIT_FAILED)?;
        Ok(())
    }

    async fn schedule_poll_sync(&self, tweet_id: &str, next: DateTime<Utc>) -> Result<()> {
        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::SyncNextTimeTweet, Expr::value(naive(next)))
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn stop_poll_sync(&self, tweet_id: &str) -> Result<()> {
        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::SyncStopTweet, Expr::value(true))
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn save_replies(&self, tweet_id: &str, replies: &[ReplySnapshot]) -> Result<()> {
        if replies.is_empty() {
            return Ok(());
        }

        let now = Utc::now().naive_utc();
        let models = replies.iter().map(|reply| degov_tweet_reply::ActiveModel {
            id: Set(reply.id.clone()),
            tweet_id: Set(tweet_id.to_string()),
            conversation_id: Set(reply.conversation_id.clone()),
            author_id: Set(reply.author_id.clone()),
            text: Set(reply.text.clone()),
            like_count: Set(reply.public_metrics.like_count),
            retweet_count: Set(reply.public_metrics.retweet_count),
            reply_count: Set(reply.public_metrics.reply_count),
            quote_count: Set(reply.public_metrics.quote_count),
            impression_count: Set(reply.public_metrics.impression_count),
            created_at: Set(naive(reply.created_at)),
            utime: Set(now),
        });

        degov_tweet_reply::Entity::insert_many(models)
            .on_conflict(
                OnConflict::column(degov_tweet_reply::Column::Id)
                    .update_columns([
                        degov_tweet_reply::Column::Text,
                        degov_tweet_reply::Column::LikeCount,
                        degov_tweet_reply::Column::RetweetCount,
                        degov_tweet_reply::Column::ReplyCount,
                        degov_tweet_reply::Column::QuoteCount,
                        degov_tweet_reply::Column::ImpressionCount,
                        degov_tweet_reply::Column::Utime,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn schedule_reply_sync(&self, tweet_id: &str, next_token: Option<String>, next: DateTime<Utc>) -> Result<()> {
        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::ReplyNextToken, Expr::value(next_token))
            .col_expr(degov_tweet::Column::SyncNextTimeReply, Expr::value(naive(next)))
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn stop_reply_sync(&self, tweet_id: &str) -> Result<()> {
        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::SyncStopReply, Expr::value(true))
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn poll_for_tweet(&self, tweet_id: &str) -> Result<Option<StoredPoll>> {
        let Some(poll) = degov_tweet_poll::Entity::find()
            .filter(degov_tweet_poll::Column::TweetId.eq(tweet_id))
            .order_by_desc(degov_tweet_poll::Column::Utime)
            .one(&self.db)
            .await?
        else {
            return Ok(None);
        };

        let options = degov_tweet_poll_option::Entity::find()
            .filter(degov_tweet_poll_option::Column::PollId.eq(poll.id.clone()))
            .order_by_asc(degov_tweet_poll_option::Column::Position)
            .all(&self.db)
            .await?;

        Ok(Some(StoredPoll { poll, options }))
    }

    async fn replies_for_tweet(&self, tweet_id: &str) -> Result<Vec<degov_tweet_reply::Model>> {
        Ok(degov_tweet_reply::Entity::find()
            .filter(degov_tweet_reply::Column::TweetId.eq(tweet_id))
            .order_by_asc(degov_tweet_reply::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    async fn tweets_for_vote_relay(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>> {
        Ok(degov_tweet::Entity::find()
            .filter(degov_tweet::Column::Daocode.eq(daocode))
            .filter(degov_tweet::Column::TweetType.eq(TweetType::Poll))
            .filter(degov_tweet::Column::Status.is_in(OPEN_STATUSES))
            .filter(degov_tweet::Column::TimesProcessed.lt(RETRY_CEILING))
            .order_by_asc(degov_tweet::Column::Ctime)
            .all(&self.db)
            .await?)
    }

    async fn vote_offset(&self, daocode: &str, proposal_id: &str) -> Result<i64> {
        let progress = degov_vote_progress::Entity::find_by_id((proposal_id.to_string(), daocode.to_string()))
            .one(&self.db)
            .await?;
        Ok(progress.map(|p| p.offset).unwrap_or(0))
    }

    async fn advance_vote_offset(&self, daocode: &str, proposal_id: &str, chain_id: i32, offset: i64) -> Result<()> {
        if offset <= 0 {
            return Ok(());
        }

        let progress = degov_vote_progress::ActiveModel {
            proposal_id: Set(proposal_id.to_string()),
            daocode: Set(daocode.to_string()),
            chain_id: Set(chain_id),
            offset: Set(offset),
            utime: Set(Utc::now().naive_utc()),
        };

        degov_vote_progress::Entity::insert(progress)
            .on_conflict(
                OnConflict::columns([degov_vote_progress::Column::ProposalId, degov_vote_progress::Column::Daocode])
                    .value(
                        degov_vote_progress::Column::Offset,
                        Expr::cust(r#"GREATEST(degov_vote_progress."offset", EXCLUDED."offset")"#),
                    )
                    .update_column(degov_vote_progress::Column::Utime)
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn relayed_votes(&self, daocode: &str, proposal_id: &str, vote_ids: &[String]) -> Result<HashSet<String>> {
        if vote_ids.is_empty() {
            return Ok(HashSet::new());
        }

        let relayed = degov_vote_relayed::Entity::find()
            .filter(degov_vote_relayed::Column::ProposalId.eq(proposal_id))
            .filter(degov_vote_relayed::Column::Daocode.eq(daocode))
            .filter(degov_vote_relayed::Column::VoteId.is_in(vote_ids.iter().cloned()))
            .all(&self.db)
            .await?;
        Ok(relayed.into_iter().map(|row| row.vote_id).collect())
    }

    async fn record_vote_relayed(&self, daocode: &str, proposal_id: &str, vote_id: &str, reply_id: &str) -> Result<()> {
        let row = degov_vote_relayed::ActiveModel {
            proposal_id: Set(proposal_id.to_string()),
            daocode: Set(daocode.to_string()),
            vote_id: Set(vote_id.to_string()),
            reply_id: Set(reply_id.to_string()),
            ctime: Set(Utc::now().naive_utc()),
        };

        degov_vote_relayed::Entity::insert(row)
            .on_conflict(
                OnConflict::columns([
                    degov_vote_relayed::Column::ProposalId,
                    degov_vote_relayed::Column::Daocode,
                    degov_vote_relayed::Column::VoteId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await?;
        Ok(())
    }

    async fn tweets_for_fulfillment(&self, daocode: &str) -> Result<Vec<degov_tweet::Model>> {
        Ok(degov_tweet::Entity::find()
            .filter(degov_tweet::Column::Daocode.eq(daocode))
            .filter(degov_tweet::Column::TweetType.eq(TweetType::Poll))
            .filter(degov_tweet::Column::Fulfilled.eq(false))
            .filter(degov_tweet::Column::Status.is_in(OPEN_STATUSES))
            .filter(degov_tweet::Column::TimesProcessed.lt(RETRY_CEILING))
            .order_by_asc(degov_tweet::Column::ProposalVoteEnd)
            .all(&self.db)
            .await?)
    }

    async fn mark_fulfilled(&self, tweet_id: &str, explain: Value, fulfilled_at: DateTime<Utc>) -> Result<()> {
        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::Fulfilled, Expr::value(true))
            .col_expr(degov_tweet::Column::FulfilledExplain, Expr::value(explain))
            .col_expr(degov_tweet::Column::FulfilledAt, Expr::value(naive(fulfilled_at)))
            .col_expr(degov_tweet::Column::SyncStopReply, Expr::value(true))
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .filter(degov_tweet::Column::Fulfilled.eq(false))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    async fn record_failure(&self, tweet_id: &str, message: &str) -> Result<()> {
        let txn = self
            .db
            .begin()
            .await
            .context(DB_TRANSACTION_BEGIN_FAILED)?;

        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::TimesProcessed, Expr::cust("times_processed + 1"))
            .col_expr(
                degov_tweet::Column::Message,
                Expr::cust_with_values(
                    "CASE WHEN message IS NULL OR message = '' THEN $1 ELSE message || $2 END",
                    [message.to_string(), format!("{MESSAGE_SEPARATOR}{message}")],
                ),
            )
            .col_expr(degov_tweet::Column::Utime, now_expr())
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .exec(&txn)
            .await?;

        degov_tweet::Entity::update_many()
            .col_expr(degov_tweet::Column::Status, Expr::value(TweetStatus::Error.into_value()))
            .filter(degov_tweet::Column::Id.eq(tweet_id))
            .filter(degov_tweet::Column::TimesProcessed.gte(RETRY_CEILING))
            .exec(&txn)
            .await?;

        txn.commit()
            .await
            .context(DB_TRANSACTION_COMMIT_FAILED)?;
        Ok(())
    }
}
