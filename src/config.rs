use std::time::Duration;

pub const MAX_BODY_BYTES: usize = 140_000;
pub const MAX_TEXT_CHARS: usize = 50_000;
pub const MAX_OUTPUT_TOKENS: u32 = 900;
pub const GENERATE_TIMEOUT: Duration = Duration::from_secs(20);
pub const FEED_TTL: Duration = Duration::from_secs(120);
pub const TIMELINE_PAGE_SIZE: u32 = 10;
pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;
pub const DEFAULT_MODEL: &str = "grok-4";

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub xai_api_key: Option<String>,
    pub model: String,
    pub allowed_origin: Option<String>,
    pub app_key: Option<String>,
    pub x_bearer_token: Option<String>,
    pub x_handle: Option<String>,
    pub rate_limit: Option<RateLimitConfig>,
    pub chat_api_url: String,
    pub x_api_base: String,
    pub feed_ttl: Duration,
    pub generate_timeout: Duration,
    pub max_body_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            xai_api_key: None,
            model: DEFAULT_MODEL.to_string(),
            allowed_origin: None,
            app_key: None,
            x_bearer_token: None,
            x_handle: None,
            rate_limit: None,
            chat_api_url: "https://api.x.ai/v1/chat/completions".to_string(),
            x_api_base: "https://api.x.com".to_string(),
            feed_ttl: FEED_TTL,
            generate_timeout: GENERATE_TIMEOUT,
            max_body_bytes: MAX_BODY_BYTES,
        }
    }
}

/// Empty values count as unset so a blank entry in the deploy env does not
/// silently enable a feature with an empty secret.
fn env_opt(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Zero or unparseable values disable the limiter (`RATE_LIMIT`) or fall back
/// to the default window (`RATE_WINDOW_SECS`); a zero-length window would
/// reset on every request and turn the sweep task into a busy loop.
fn parse_rate_limit(limit: Option<String>, window_secs: Option<String>) -> Option<RateLimitConfig> {
    let limit = limit.and_then(|v| v.parse::<u32>().ok()).filter(|l| *l > 0)?;
    let window_secs = window_secs
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(DEFAULT_RATE_WINDOW_SECS);
    Some(RateLimitConfig {
        limit,
        window: Duration::from_secs(window_secs),
    })
}

impl AppConfig {
    pub fn from_env() -> Self {
        let rate_limit = parse_rate_limit(env_opt("RATE_LIMIT"), env_opt("RATE_WINDOW_SECS"));
        AppConfig {
            xai_api_key: env_opt("XAI_API_KEY"),
            model: env_opt("GROK_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            allowed_origin: env_opt("APP_ALLOWED_ORIGIN"),
            app_key: env_opt("APP_SHARED_KEY"),
            x_bearer_token: env_opt("X_BEARER_TOKEN"),
            x_handle: env_opt("X_ALLOWED_HANDLE"),
            rate_limit,
            ..AppConfig::default()
        }
    }
}
