use crate::{
    config::{DaoConfig, JobOptions},
    extensions::{
        ai::AiClient, chain::GovernorChain, clients::ClientAuthority, db_extension::TweetStore,
        indexer::GovernanceIndexer,
    },
};
use anyhow::Result;
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, instrument};

pub mod fulfillment;
pub mod proposal_discovery;
pub mod status_tracking;
pub mod tweet_sync;
pub mod vote_relay;

/// Collaborators shared by every job.
#[derive(Clone)]
pub struct AgentContext {
    pub store: Arc<dyn TweetStore>,
    pub indexer: Arc<dyn GovernanceIndexer>,
    pub ai: Arc<dyn AiClient>,
    pub clients: Arc<ClientAuthority>,
    pub options: JobOptions,
}

/// One configured DAO and the governor client for its chain.
#[derive(Clone)]
pub struct DaoContext {
    pub dao: DaoConfig,
    pub chain: Arc<dyn GovernorChain>,
}

#[async_trait]
pub trait Job: Send + Sync {
    fn name(&self) -> String;

    fn interval(&self) -> Duration;

    async fn tick(&self) -> Result<()>;
}

/// Runs `job` forever. The next tick is armed only after the current one returns.
#[instrument(name = "run_periodic", skip_all, fields(job = %job.name()))]
pub async fn run_periodic(job: Arc<dyn Job>) -> Result<()> {
    info!(interval = ?job.interval(), "Starting periodic job");
    let mut interval = time::interval(job.interval());
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match job.tick().await {
            Ok(()) => info!("Job tick completed"),
            Err(e) => error!(error = ?e, "Job tick failed"),
        }
    }
}

/// Error text stored on a tweet, including the context chain.
pub(crate) fn failure_message(err: &anyhow::Error) -> String {
    format!("{err:#}")
}
