use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedUser {
    pub name: Option<String>,
    pub username: String,
    pub pfp: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedMedia {
    #[serde(rename = "type")]
    pub media_type: String,
    pub url: Option<String>,
    pub alt: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedTweet {
    pub id: String,
    pub text: String,
    pub created_at: Option<String>,
    pub metrics: Value,
    pub media: Vec<FeedMedia>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FeedPayload {
    pub handle: String,
    pub user: FeedUser,
    pub tweets: Vec<FeedTweet>,
}

impl FeedPayload {
    /// Response body for this payload, with the cache marker stamped in.
    pub fn to_response_json(&self, cached: bool) -> Value {
        let mut body = serde_json::to_value(self).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut body {
            map.insert("cached".to_string(), Value::Bool(cached));
        }
        body
    }
}

/// X handle syntax: 1-15 word characters.
pub fn valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= 15
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn opt_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// Flattens the two upstream responses (user lookup + timeline with media
/// expansions) into the simplified shape the frontend consumes. Attachment
/// keys with no matching media object are dropped; a media URL prefers `url`
/// and falls back to `preview_image_url`.
pub fn flatten(handle: &str, user_data: &Value, timeline: &Value) -> FeedPayload {
    let user = FeedUser {
        name: opt_str(user_data, "name"),
        username: opt_str(user_data, "username").unwrap_or_else(|| handle.to_string()),
        pfp: opt_str(user_data, "profile_image_url"),
    };

    let media_by_key: HashMap<&str, &Value> = timeline
        .pointer("/includes/media")
        .and_then(Value::as_array)
        .map(|media| {
            media
                .iter()
                .filter_map(|m| m.get("media_key").and_then(Value::as_str).map(|k| (k, m)))
                .collect()
        })
        .unwrap_or_default();

    let tweets = timeline
        .get("data")
        .and_then(Value::as_array)
        .map(|posts| {
            posts
                .iter()
                .map(|post| {
                    let media = post
                        .pointer("/attachments/media_keys")
                        .and_then(Value::as_array)
                        .map(|keys| {
                            keys.iter()
                                .filter_map(Value::as_str)
                                .filter_map(|key| media_by_key.get(key))
                                .map(|m| FeedMedia {
                                    media_type: opt_str(m, "type").unwrap_or_default(),
                                    url: opt_str(m, "url")
                                        .or_else(|| opt_str(m, "preview_image_url")),
                                    alt: opt_str(m, "alt_text").unwrap_or_default(),
                                })
                                .collect()
                        })
                        .unwrap_or_default();
                    FeedTweet {
                        id: opt_str(post, "id").unwrap_or_default(),
                        text: opt_str(post, "text").unwrap_or_default(),
                        created_at: opt_str(post, "created_at"),
                        metrics: post
                            .get("public_metrics")
                            .cloned()
                            .unwrap_or_else(|| Value::Object(Default::default())),
                        media,
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    FeedPayload {
        handle: handle.to_string(),
        user,
        tweets,
    }
}

struct Snapshot {
    captured_at: Instant,
    payload: FeedPayload,
}

/// Single-slot cache for the one feed this gateway serves. Concurrent misses
/// may race the upstream fetch; last writer wins on the slot.
#[derive(Clone, Default)]
pub struct FeedCache {
    slot: Arc<Mutex<Option<Snapshot>>>,
}

impl FeedCache {
    pub fn new() -> Self {
        FeedCache::default()
    }

    pub fn get(&self, ttl: Duration) -> Option<FeedPayload> {
        let slot = self.slot.lock().ok()?;
        slot.as_ref()
            .filter(|snapshot| snapshot.captured_at.elapsed() < ttl)
            .map(|snapshot| snapshot.payload.clone())
    }

    pub fn set(&self, payload: FeedPayload) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(Snapshot {
                captured_at: Instant::now(),
                payload,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn handle_syntax() {
        assert!(valid_handle("elder_plinius"));
        assert!(valid_handle("a"));
        assert!(valid_handle("ABC_123"));
        assert!(!valid_handle(""));
        assert!(!valid_handle("way_too_long_handle"));
        assert!(!valid_handle("spaced out"));
        assert!(!valid_handle("dash-ed"));
    }

    fn sample_timeline() -> Value {
        json!({
            "data": [
                {
                    "id": "1",
                    "text": "first post",
                    "created_at": "2025-01-01T00:00:00.000Z",
                    "public_metrics": {"like_count": 3},
                    "attachments": {"media_keys": ["m1", "missing"]}
                },
                {"id": "2", "text": "no media"}
            ],
            "includes": {
                "media": [
                    {"media_key": "m1", "type": "video", "preview_image_url": "p.jpg", "alt_text": "clip"},
                    {"media_key": "m2", "type": "photo", "url": "u.jpg"}
                ]
            }
        })
    }

    #[test]
    fn flatten_resolves_media_and_drops_unknown_keys() {
        let user = json!({"id": "9", "name": "Some One", "username": "someone",
                          "profile_image_url": "pfp.jpg"});
        let payload = flatten("someone", &user, &sample_timeline());

        assert_eq!(payload.user.name.as_deref(), Some("Some One"));
        assert_eq!(payload.user.pfp.as_deref(), Some("pfp.jpg"));
        assert_eq!(payload.tweets.len(), 2);

        let first = &payload.tweets[0];
        assert_eq!(first.metrics, json!({"like_count": 3}));
        // "missing" had no media object, so only m1 survives
        assert_eq!(first.media.len(), 1);
        assert_eq!(first.media[0].media_type, "video");
        // no url on the video, preview is the fallback
        assert_eq!(first.media[0].url.as_deref(), Some("p.jpg"));
        assert_eq!(first.media[0].alt, "clip");

        let second = &payload.tweets[1];
        assert!(second.media.is_empty());
        assert_eq!(second.metrics, json!({}));
        assert_eq!(second.created_at, None);
    }

    #[test]
    fn flatten_prefers_direct_url_over_preview() {
        let timeline = json!({
            "data": [{"id": "1", "text": "t", "attachments": {"media_keys": ["m"]}}],
            "includes": {"media": [
                {"media_key": "m", "type": "photo", "url": "u.jpg", "preview_image_url": "p.jpg"}
            ]}
        });
        let payload = flatten("h", &json!({}), &timeline);
        assert_eq!(payload.tweets[0].media[0].url.as_deref(), Some("u.jpg"));
    }

    #[test]
    fn flatten_falls_back_to_configured_handle() {
        let payload = flatten("fallback", &json!({}), &json!({}));
        assert_eq!(payload.user.username, "fallback");
        assert_eq!(payload.user.name, None);
        assert!(payload.tweets.is_empty());
    }

    #[test]
    fn response_json_carries_cache_marker() {
        let payload = flatten("h", &json!({"username": "h"}), &json!({}));
        let hit = payload.to_response_json(true);
        let miss = payload.to_response_json(false);
        assert_eq!(hit["cached"], json!(true));
        assert_eq!(miss["cached"], json!(false));
        // everything else is byte-identical between hit and miss
        let strip = |mut v: Value| {
            v.as_object_mut().unwrap().remove("cached");
            v
        };
        assert_eq!(strip(hit), strip(miss));
    }

    #[test]
    fn cache_serves_fresh_and_expires() {
        let cache = FeedCache::new();
        assert!(cache.get(Duration::from_secs(120)).is_none());

        let payload = flatten("h", &json!({}), &json!({}));
        cache.set(payload.clone());
        assert_eq!(cache.get(Duration::from_secs(120)), Some(payload.clone()));

        // zero TTL: already stale
        assert!(cache.get(Duration::ZERO).is_none());

        // overwrite wins
        let newer = flatten("other", &json!({}), &json!({}));
        cache.set(newer.clone());
        assert_eq!(cache.get(Duration::from_secs(120)), Some(newer));
    }
}
