use crate::config::{AppConfig, MAX_OUTPUT_TOKENS, TIMELINE_PAGE_SIZE};
use crate::feed::{FeedCache, FeedPayload, flatten};
use crate::generate::{PromptInput, SYSTEM_PROMPT, extract_output, temperature_for, upstream_detail};
use crate::guard::RateLimiter;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[derive(Debug)]
pub enum UpstreamError {
    /// Upstream answered with a non-success status.
    Failed { status: u16, detail: String },
    TimedOut,
    Other(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::TimedOut
        } else {
            UpstreamError::Other(err.to_string())
        }
    }
}

#[derive(Debug)]
pub enum FeedError {
    UserLookup { status: u16 },
    MissingUserId,
    Timeline { status: u16 },
    Transport(String),
}

impl From<reqwest::Error> for FeedError {
    fn from(err: reqwest::Error) -> Self {
        FeedError::Transport(err.to_string())
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub client: reqwest::Client,
    pub feed_cache: FeedCache,
    pub limiter: Option<RateLimiter>,
}

impl AppState {
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.generate_timeout)
            .build()?;
        let limiter = config.rate_limit.as_ref().map(RateLimiter::new);
        Ok(AppState {
            config,
            client,
            feed_cache: FeedCache::new(),
            limiter,
        })
    }

    /// One round-trip to the chat-completion API. The per-request timeout set
    /// on the client bounds the whole call; reqwest tears the request down on
    /// every exit path.
    pub async fn rewrite(&self, api_key: &str, input: &PromptInput) -> Result<String, UpstreamError> {
        let request = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": input.user_prompt()},
            ],
            "temperature": temperature_for(&input.variant),
            "max_tokens": MAX_OUTPUT_TOKENS,
            "stream": false,
        });

        let response = self
            .client
            .post(&self.config.chat_api_url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        let data: Option<Value> = serde_json::from_str(&raw).ok();

        if !status.is_success() {
            return Err(UpstreamError::Failed {
                status: status.as_u16(),
                detail: upstream_detail(data.as_ref(), status.as_u16()),
            });
        }
        Ok(extract_output(&data.unwrap_or(Value::Null)))
    }

    async fn fetch_json(&self, url: &str, bearer: &str) -> Result<(StatusCode, Value), reqwest::Error> {
        let response = self
            .client
            .get(url)
            .bearer_auth(bearer)
            .header("Accept", "application/json")
            .send()
            .await?;
        let status = response.status();
        let raw = response.text().await?;
        Ok((status, serde_json::from_str(&raw).unwrap_or(Value::Null)))
    }

    /// Cache-miss path: resolve the handle, pull the timeline with media
    /// expansions, flatten. The caller decides what to do with the cache.
    pub async fn fetch_feed(&self, bearer: &str, handle: &str) -> Result<FeedPayload, FeedError> {
        let user_url = format!(
            "{}/2/users/by/username/{}?user.fields=profile_image_url",
            self.config.x_api_base, handle
        );
        let (status, user_body) = self.fetch_json(&user_url, bearer).await?;
        if !status.is_success() {
            return Err(FeedError::UserLookup {
                status: status.as_u16(),
            });
        }
        let user_data = user_body.get("data").cloned().unwrap_or(Value::Null);
        let user_id = user_data
            .get("id")
            .and_then(Value::as_str)
            .ok_or(FeedError::MissingUserId)?
            .to_string();

        let timeline_url = format!(
            "{}/2/users/{}/tweets?max_results={}&exclude=retweets,replies\
             &tweet.fields=created_at,public_metrics,attachments\
             &expansions=attachments.media_keys\
             &media.fields=type,url,preview_image_url,alt_text",
            self.config.x_api_base, user_id, TIMELINE_PAGE_SIZE
        );
        let (status, timeline) = self.fetch_json(&timeline_url, bearer).await?;
        if !status.is_success() {
            return Err(FeedError::Timeline {
                status: status.as_u16(),
            });
        }

        Ok(flatten(handle, &user_data, &timeline))
    }
}
