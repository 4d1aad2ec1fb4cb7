use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Deserialize, Deserializer, de::DeserializeOwned};
use serde_json::json;
use tracing::{debug, instrument};

/// A proposal as reported by the DAO's governance indexer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub proposal_id: String,
    #[serde(default)]
    pub proposer: String,
    pub description: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub vote_start: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub vote_end: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub block_number: u64,
    /// Milliseconds since epoch.
    #[serde(deserialize_with = "flexible_u64")]
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteCast {
    pub id: String,
    pub voter: String,
    #[serde(deserialize_with = "flexible_u64")]
    pub support: u64,
    pub weight: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(deserialize_with = "flexible_u64")]
    pub block_number: u64,
    #[serde(deserialize_with = "flexible_u64")]
    pub block_timestamp: u64,
    pub transaction_hash: String,
}

/// A canceled/queued/executed event for one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEvent {
    pub transaction_hash: String,
    pub eta_seconds: Option<u64>,
}

#[async_trait]
pub trait GovernanceIndexer: Send + Sync {
    /// Proposals created after `since_block`, oldest first.
    async fn next_proposals(&self, endpoint: &str, since_block: i64, limit: usize) -> Result<Vec<Proposal>>;

    async fn proposal(&self, endpoint: &str, proposal_id: &str) -> Result<Option<Proposal>>;

    async fn proposal_votes(&self, endpoint: &str, proposal_id: &str, offset: usize, limit: usize) -> Result<Vec<VoteCast>>;

    async fn proposal_canceled(&self, endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>>;

    async fn proposal_queued(&self, endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>>;

    async fn proposal_executed(&self, endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>>;

    /// Every vote cast on a proposal, following pagination to the end.
    async fn all_proposal_votes(&self, endpoint: &str, proposal_id: &str, page_size: usize) -> Result<Vec<VoteCast>> {
        let mut all_votes = Vec::new();
        loop {
            let votes = self
                .proposal_votes(endpoint, proposal_id, all_votes.len(), page_size)
                .await?;
            let fetched = votes.len();
            all_votes.extend(votes);
            if fetched < page_size {
                break;
            }
        }
        Ok(all_votes)
    }
}

#[derive(Deserialize, Debug)]
struct GraphqlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Option<Vec<GraphqlError>>,
}

#[derive(Deserialize, Debug)]
struct GraphqlError {
    message: String,
}

#[derive(Deserialize, Debug)]
struct ProposalsData {
    proposals: Vec<Proposal>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct VoteCastsData {
    vote_casts: Vec<VoteCast>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct EventRow {
    transaction_hash: String,
    #[serde(default, deserialize_with = "flexible_opt_u64")]
    eta_seconds: Option<u64>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct CanceledData {
    proposal_canceleds: Vec<EventRow>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct QueuedData {
    proposal_queueds: Vec<EventRow>,
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct ExecutedData {
    proposal_executeds: Vec<EventRow>,
}

impl From<EventRow> for TransitionEvent {
    fn from(row: EventRow) -> Self {
        Self {
            transaction_hash: row.transaction_hash,
            eta_seconds: row.eta_seconds,
        }
    }
}

const PROPOSALS_QUERY: &str = r#"
query NextProposals($since: BigInt!, $limit: Int!) {
  proposals(where: {blockNumber_gt: $since}, orderBy: blockNumber_ASC, limit: $limit) {
    proposalId
    proposer
    description
    voteStart
    voteEnd
    blockNumber
    blockTimestamp
    transactionHash
  }
}"#;

const PROPOSAL_QUERY: &str = r#"
query ProposalById($proposalId: String!) {
  proposals(where: {proposalId_eq: $proposalId}, limit: 1) {
    proposalId
    proposer
    description
    voteStart
    voteEnd
    blockNumber
    blockTimestamp
    transactionHash
  }
}"#;

const VOTES_QUERY: &str = r#"
query ProposalVotes($proposalId: String!, $offset: Int!, $limit: Int!) {
  voteCasts(where: {proposalId_eq: $proposalId}, orderBy: blockNumber_ASC, offset: $offset, limit: $limit) {
    id
    voter
    support
    weight
    reason
    blockNumber
    blockTimestamp
    transactionHash
  }
}"#;

const CANCELED_QUERY: &str = r#"
query ProposalCanceled($proposalId: String!) {
  proposalCanceleds(where: {proposalId_eq: $proposalId}, limit: 1) {
    transactionHash
  }
}"#;

const QUEUED_QUERY: &str = r#"
query ProposalQueued($proposalId: String!) {
  proposalQueueds(where: {proposalId_eq: $proposalId}, limit: 1) {
    transactionHash
    etaSeconds
  }
}"#;

const EXECUTED_QUERY: &str = r#"
query ProposalExecuted($proposalId: String!) {
  proposalExecuteds(where: {proposalId_eq: $proposalId}, limit: 1) {
    transactionHash
  }
}"#;

/// GraphQL client for DeGov squid indexers.
pub struct GraphqlIndexer {
    client: ClientWithMiddleware,
}

impl GraphqlIndexer {
    pub fn new() -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
        let client = ClientBuilder::new(Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self { client }
    }

    async fn fetch_graphql<T>(&self, endpoint: &str, query: &str, variables: serde_json::Value) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .client
            .post(endpoint)
            .header("Content-Type", "application/json")
            .body(serde_json::to_string(&json!({ "query": query, "variables": variables }))?)
            .send()
            .await
            .with_context(|| format!("Indexer request to {endpoint} failed"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "Indexer error: status={}, body={}",
                status,
                text
            ));
        }

        let body = response.text().await?;
        let parsed: GraphqlResponse<T> = serde_json::from_str(&body).context("Failed to parse indexer response")?;

        if let Some(errors) = parsed.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(anyhow::anyhow!("Indexer returned errors: {}", messages.join("; ")));
        }

        parsed
            .data
            .context("Indexer response contained no data")
    }
}

impl Default for GraphqlIndexer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GovernanceIndexer for GraphqlIndexer {
    #[instrument(name = "indexer_next_proposals", skip(self))]
    async fn next_proposals(&self, endpoint: &str, since_block: i64, limit: usize) -> Result<Vec<Proposal>> {
        let data: ProposalsData = self
            .fetch_graphql(
                endpoint,
                PROPOSALS_QUERY,
                json!({ "since": since_block.to_string(), "limit": limit }),
            )
            .await?;
        debug!(count = data.proposals.len(), "Fetched proposals");
        Ok(data.proposals)
    }

    async fn proposal(&self, endpoint: &str, proposal_id: &str) -> Result<Option<Proposal>> {
        let data: ProposalsData = self
            .fetch_graphql(endpoint, PROPOSAL_QUERY, json!({ "proposalId": proposal_id }))
            .await?;
        Ok(data.proposals.into_iter().next())
    }

    #[instrument(name = "indexer_proposal_votes", skip(self))]
    async fn proposal_votes(&self, endpoint: &str, proposal_id: &str, offset: usize, limit: usize) -> Result<Vec<VoteCast>> {
        let data: VoteCastsData = self
            .fetch_graphql(
                endpoint,
                VOTES_QUERY,
                json!({ "proposalId": proposal_id, "offset": offset, "limit": limit }),
            )
            .await?;
        debug!(count = data.vote_casts.len(), "Fetched vote batch");
        Ok(data.vote_casts)
    }

    async fn proposal_canceled(&self, endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        let data: CanceledData = self
            .fetch_graphql(endpoint, CANCELED_QUERY, json!({ "proposalId": proposal_id }))
            .await?;
        Ok(data.proposal_canceleds.into_iter().next().map(Into::into))
    }

    async fn proposal_queued(&self, endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        let data: QueuedData = self
            .fetch_graphql(endpoint, QUEUED_QUERY, json!({ "proposalId": proposal_id }))
            .await?;
        Ok(data.proposal_queueds.into_iter().next().map(Into::into))
    }

    async fn proposal_executed(&self, endpoint: &str, proposal_id: &str) -> Result<Option<TransitionEvent>> {
        let data: ExecutedData = self
            .fetch_graphql(endpoint, EXECUTED_QUERY, json!({ "proposalId": proposal_id }))
            .await?;
        Ok(data.proposal_executeds.into_iter().next().map(Into::into))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

impl NumberOrText {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrText::Number(n) => Ok(n),
            NumberOrText::Text(s) => s.trim().parse().map_err(E::custom),
        }
    }
}

// BigInt columns arrive as JSON strings.
fn flexible_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrText::deserialize(deserializer)?.into_u64()
}

fn flexible_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrText>::deserialize(deserializer)?
        .map(NumberOrText::into_u64)
        .transpose()
}
