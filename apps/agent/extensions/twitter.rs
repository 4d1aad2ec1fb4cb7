use crate::config::XCredentials;
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{
    Client, Method, RequestBuilder, StatusCode,
    header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, RETRY_AFTER},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

const DEFAULT_MAX_RETRIES: usize = 3;
const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_RATE_LIMIT_WAIT: Duration = Duration::from_secs(15 * 60);
const SEARCH_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollDraft {
    pub options: Vec<String>,
    pub duration_minutes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetDraft {
    pub text: String,
    pub poll: Option<PollDraft>,
    pub reply_to: Option<String>,
}

impl TweetDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            poll: None,
            reply_to: None,
        }
    }

    pub fn with_poll(mut self, poll: PollDraft) -> Self {
        self.poll = Some(poll);
        self
    }

    pub fn in_reply_to(mut self, tweet_id: impl Into<String>) -> Self {
        self.reply_to = Some(tweet_id.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollOptionSnapshot {
    pub position: i32,
    pub label: String,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PollSnapshot {
    pub id: String,
    pub options: Vec<PollOptionSnapshot>,
    #[serde(default)]
    pub voting_status: Option<String>,
    #[serde(default)]
    pub end_datetime: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
}

impl PollSnapshot {
    pub fn is_closed(&self) -> bool {
        self.voting_status.as_deref() == Some("closed")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub like_count: i64,
    #[serde(default)]
    pub retweet_count: i64,
    #[serde(default)]
    pub reply_count: i64,
    #[serde(default)]
    pub quote_count: i64,
    #[serde(default)]
    pub impression_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReplySnapshot {
    pub id: String,
    pub conversation_id: String,
    pub author_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub public_metrics: PublicMetrics,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplyPage {
    pub replies: Vec<ReplySnapshot>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait SocialPlatform: Send + Sync {
    /// Account id the agent posts as.
    fn user_id(&self) -> &str;

    /// Returns the id of the new tweet.
    async fn send_tweet(&self, draft: &TweetDraft) -> Result<String>;

    async fn get_poll(&self, tweet_id: &str) -> Result<Option<PollSnapshot>>;

    async fn search_replies(&self, conversation_id: &str, next_token: Option<&str>) -> Result<ReplyPage>;
}

#[derive(Serialize)]
struct CreateTweetBody<'a> {
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    poll: Option<&'a PollDraft>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply: Option<ReplyTarget<'a>>,
}

#[derive(Serialize)]
struct ReplyTarget<'a> {
    in_reply_to_tweet_id: &'a str,
}

#[derive(Deserialize)]
struct CreateTweetResponse {
    data: CreatedTweet,
}

#[derive(Deserialize)]
struct CreatedTweet {
    id: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    #[serde(default)]
    includes: Option<LookupIncludes>,
}

#[derive(Deserialize)]
struct LookupIncludes {
    #[serde(default)]
    polls: Vec<PollSnapshot>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<ReplySnapshot>,
    #[serde(default)]
    meta: Option<SearchMeta>,
}

#[derive(Deserialize)]
struct SearchMeta {
    #[serde(default)]
    next_token: Option<String>,
}

/// X API v2 client for one posting profile.
pub struct XApi {
    client: Client,
    base_url: String,
    credentials: XCredentials,
    max_retries: usize,
    initial_backoff: Duration,
}

impl XApi {
    pub fn new(base_url: &str, credentials: XCredentials) -> Result<Self> {
        Self::new_with_config(base_url, credentials, DEFAULT_MAX_RETRIES, DEFAULT_INITIAL_BACKOFF)
    }

    pub fn new_with_config(base_url: &str, credentials: XCredentials, max_retries: usize, initial_backoff: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build X API client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            max_retries,
            initial_backoff,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(AUTHORIZATION, format!("Bearer {}", self.credentials.access_token))
    }

    async fn execute<T, F>(&self, path: &str, build: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut delay = self.initial_backoff;

        loop {
            match build().send().await {
                Ok(response) => match response.status() {
                    status if status.is_success() => {
                        let body = response
                            .text()
                            .await
                            .map_err(|e| anyhow!("Failed to get response text: {}", e))?;
                        return serde_json::from_str(&body).with_context(|| format!("Failed to parse X API response from {path}"));
                    }
                    StatusCode::TOO_MANY_REQUESTS => {
                        attempt += 1;
                        if attempt > self.max_retries {
                            error!(path = path, "Max retries reached. Last error: HTTP 429");
                            return Err(anyhow!("Max retries reached. Last error: HTTP 429"));
                        }

                        let wait = rate_limit_wait(response.headers(), delay, Utc::now());
                        warn!(path = path, wait = ?wait, "Rate limited (429). Waiting before retrying...");
                        sleep(wait).await;
                        delay = delay.max(wait) * 2;
                    }
                    status if status.is_server_error() => {
                        attempt += 1;
                        if attempt > self.max_retries {
                            error!(path = path, status = %status, "Max retries reached. Server error");
                            return Err(anyhow!("Max retries reached. Last error: HTTP {}", status));
                        }

                        warn!(path = path, status = %status, delay = ?delay, "Server error. Waiting before retrying...");
                        sleep(delay).await;
                        delay *= 2;
                    }
                    status => {
                        let body = response.text().await.unwrap_or_default();
                        error!(path = path, status = %status, body = body, "X API request failed");
                        return Err(anyhow!("X API request failed with status {}: {}", status, body));
                    }
                },
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(path = path, error = %e, "Max retries reached");
                        return Err(anyhow!("Max retries reached. Last error: {}", e));
                    }
                    warn!(path = path, error = %e, delay = ?delay, "Request error. Retrying...");
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

/// How long to wait after a 429, preferring the reset time X reports.
fn rate_limit_wait(headers: &HeaderMap, default: Duration, now: DateTime<Utc>) -> Duration {
    let header_secs = |name| {
        headers
            .get(name)
            .and_then(|h| h.to_str().ok())
            .and_then(|s| s.trim().parse::<i64>().ok())
    };

    let wait = if let Some(reset) = header_secs(reqwest::header::HeaderName::from_static("x-rate-limit-reset")) {
        Duration::from_secs(u64::try_from(reset.saturating_sub(now.timestamp())).unwrap_or(0).saturating_add(1))
    } else if let Some(retry_after) = header_secs(RETRY_AFTER) {
        Duration::from_secs(u64::try_from(retry_after).unwrap_or(0))
    } else {
        default
    };

    wait.min(MAX_RATE_LIMIT_WAIT)
}

#[async_trait]
impl SocialPlatform for XApi {
    fn user_id(&self) -> &str {
        &self.credentials.user_id
    }

    #[instrument(name = "x_send_tweet", skip(self, draft), fields(reply_to = ?draft.reply_to, poll = draft.poll.is_some()))]
    async fn send_tweet(&self, draft: &TweetDraft) -> Result<String> {
        let body = serde_json::to_string(&CreateTweetBody {
            text: &draft.text,
            poll: draft.poll.as_ref(),
            reply: draft.reply_to.as_deref().map(|id| ReplyTarget {
                in_reply_to_tweet_id: id,
            }),
        })?;

        let response: CreateTweetResponse = self
            .execute("/2/tweets", || {
                self.request(Method::POST, "/2/tweets")
                    .header(CONTENT_TYPE, "application/json")
                    .body(body.clone())
            })
            .await?;

        debug!(tweet_id = %response.data.id, "Tweet sent");
        Ok(response.data.id)
    }

    async fn get_poll(&self, tweet_id: &str) -> Result<Option<PollSnapshot>> {
        let path = format!("/2/tweets/{tweet_id}");
        let response: LookupResponse = self
            .execute(&path, || {
                self.request(Method::GET, &path).query(&[
                    ("expansions", "attachments.poll_ids"),
                    ("poll.fields", "duration_minutes,end_datetime,id,options,voting_status"),
                ])
            })
            .await?;

        Ok(response
            .includes
            .and_then(|includes| includes.polls.into_iter().next()))
    }

    async fn search_replies(&self, conversation_id: &str, next_token: Option<&str>) -> Result<ReplyPage> {
        let query = format!("conversation_id:{conversation_id}");
        let max_results = SEARCH_PAGE_SIZE.to_string();
        let response: SearchResponse = self
            .execute("/2/tweets/search/recent", || {
                let mut params = vec![
                    ("query", query.as_str()),
                    ("max_results", max_results.as_str()),
                    ("tweet.fields", "author_id,conversation_id,created_at,public_metrics"),
                ];
                if let Some(token) = next_token {
                    params.push(("next_token", token));
                }
                self.request(Method::GET, "/2/tweets/search/recent")
                    .query(&params)
            })
            .await?;

        Ok(ReplyPage {
            replies: response.data,
            next_token: response.meta.and_then(|meta| meta.next_token),
        })
    }
}
