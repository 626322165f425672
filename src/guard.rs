use crate::config::{AppConfig, RateLimitConfig};
use actix_web::http::{Method, StatusCode, header};
use actix_web::{HttpRequest, HttpResponse, HttpResponseBuilder};
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const ALLOWED_HEADERS: &str = "Content-Type, X-App-Key";
pub const APP_KEY_HEADER: &str = "x-app-key";
pub const CLIENT_IP_HEADER: &str = "x-forwarded-for";

/// Effective origin to echo back in CORS headers. `None` means the request's
/// origin is not allowed to use this gateway as a proxy.
pub fn pick_origin(request_origin: &str, allowed_origin: Option<&str>) -> Option<String> {
    let Some(allowed) = allowed_origin else {
        return Some(if request_origin.is_empty() {
            "*".to_string()
        } else {
            request_origin.to_string()
        });
    };
    if request_origin.is_empty() {
        return Some(allowed.to_string());
    }
    (request_origin == allowed).then(|| request_origin.to_string())
}

pub(crate) fn cors_headers(builder: &mut HttpResponseBuilder, origin: &str, methods: &str) {
    builder
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, origin))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, methods))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, ALLOWED_HEADERS))
        .insert_header((header::CACHE_CONTROL, "no-store"))
        .insert_header((header::VARY, "Origin"))
        .insert_header((header::X_CONTENT_TYPE_OPTIONS, "nosniff"))
        .insert_header((header::REFERRER_POLICY, "no-referrer"));
}

pub fn json_response(
    status: StatusCode,
    origin: &str,
    methods: &str,
    body: &serde_json::Value,
) -> HttpResponse {
    let mut builder = HttpResponse::build(status);
    cors_headers(&mut builder, origin, methods);
    builder.json(body)
}

pub fn json_error(status: StatusCode, origin: &str, methods: &str, message: &str) -> HttpResponse {
    json_response(status, origin, methods, &json!({ "error": message }))
}

struct RateWindow {
    window_start: Instant,
    count: u32,
}

/// Fixed-window limiter keyed by client IP. The map is swept periodically so
/// one-off callers do not accumulate forever.
#[derive(Clone)]
pub struct RateLimiter {
    entries: Arc<DashMap<String, RateWindow>>,
    limit: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        RateLimiter {
            entries: Arc::new(DashMap::new()),
            limit: config.limit,
            window: config.window,
        }
    }

    /// Returns false once the caller has exceeded the limit for the current
    /// window. A request arriving after the window elapsed resets it.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entry = self.entries.entry(key.to_string()).or_insert(RateWindow {
            window_start: now,
            count: 0,
        });
        if now.duration_since(entry.window_start) > self.window {
            entry.window_start = now;
            entry.count = 1;
        } else {
            entry.count += 1;
        }
        entry.count <= self.limit
    }

    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.duration_since(entry.window_start) <= self.window);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub enum Access {
    Granted { origin: String },
    Denied(HttpResponse),
}

fn header_value(req: &HttpRequest, name: &str) -> String {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string()
}

fn client_ip(req: &HttpRequest) -> String {
    let forwarded = header_value(req, CLIENT_IP_HEADER);
    let first = forwarded.split(',').next().unwrap_or("").trim();
    if first.is_empty() {
        "unknown".to_string()
    } else {
        first.to_string()
    }
}

/// Runs origin, preflight, method, app-key and rate-limit checks, in that
/// order. Business logic only runs on `Access::Granted`.
pub fn check(
    req: &HttpRequest,
    config: &AppConfig,
    limiter: Option<&RateLimiter>,
    allowed_method: Method,
    methods: &str,
) -> Access {
    let request_origin = header_value(req, "origin");
    let allowed_origin = config.allowed_origin.as_deref();
    let picked = pick_origin(&request_origin, allowed_origin);

    // Block other origins from using the gateway as an open proxy.
    let Some(origin) = picked else {
        let mut builder = HttpResponse::build(StatusCode::FORBIDDEN);
        builder.insert_header((header::VARY, "Origin"));
        return Access::Denied(builder.finish());
    };

    if req.method() == Method::OPTIONS {
        // preflight short-circuits before method/key/rate checks
        let mut builder = HttpResponse::build(StatusCode::NO_CONTENT);
        cors_headers(&mut builder, &origin, methods);
        return Access::Denied(builder.finish());
    }

    if req.method() != allowed_method {
        return Access::Denied(json_error(
            StatusCode::METHOD_NOT_ALLOWED,
            &origin,
            methods,
            "Method not allowed",
        ));
    }

    if let Some(app_key) = config.app_key.as_deref() {
        if header_value(req, APP_KEY_HEADER) != app_key {
            return Access::Denied(json_error(
                StatusCode::FORBIDDEN,
                &origin,
                methods,
                "Unauthorized client",
            ));
        }
    }

    if let Some(limiter) = limiter {
        if !limiter.check(&client_ip(req)) {
            return Access::Denied(json_error(
                StatusCode::TOO_MANY_REQUESTS,
                &origin,
                methods,
                "Rate limited",
            ));
        }
    }

    Access::Granted { origin }
}
