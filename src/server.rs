use crate::app_state::{AppState, FeedError, UpstreamError};
use crate::config::MAX_TEXT_CHARS;
use crate::feed::valid_handle;
use crate::generate::{GenerateReqInput, PromptInput};
use crate::guard::{self, Access, cors_headers, json_error, json_response};
use actix_web::http::{Method, StatusCode};
use actix_web::{App, HttpRequest, HttpResponse, HttpServer, web};
use serde_json::{Value, json};
use std::io::Write;
use std::time::Duration;

const GENERATE_METHODS: &str = "POST,OPTIONS";
const FEED_METHODS: &str = "GET,OPTIONS";

pub async fn health(_req: HttpRequest) -> HttpResponse {
    HttpResponse::Ok().body("Ok")
}

pub async fn generate(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    let origin = match guard::check(
        &req,
        &state.config,
        state.limiter.as_ref(),
        Method::POST,
        GENERATE_METHODS,
    ) {
        Access::Granted { origin } => origin,
        Access::Denied(response) => return response,
    };

    let Some(api_key) = state.config.xai_api_key.clone() else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &origin,
            GENERATE_METHODS,
            "AI not configured",
        );
    };

    if body.len() > state.config.max_body_bytes {
        return json_error(
            StatusCode::PAYLOAD_TOO_LARGE,
            &origin,
            GENERATE_METHODS,
            "Payload too large",
        );
    }

    let parsed = serde_json::from_slice::<Value>(&body)
        .ok()
        .filter(Value::is_object)
        .and_then(|value| serde_json::from_value::<GenerateReqInput>(value).ok());
    let Some(request) = parsed else {
        return json_error(
            StatusCode::BAD_REQUEST,
            &origin,
            GENERATE_METHODS,
            "Invalid JSON",
        );
    };

    let input = PromptInput::from_request(&request, MAX_TEXT_CHARS);
    if input.text.trim().is_empty() {
        return json_error(
            StatusCode::BAD_REQUEST,
            &origin,
            GENERATE_METHODS,
            "Missing text",
        );
    }

    match state.rewrite(&api_key, &input).await {
        Ok(output) => json_response(
            StatusCode::OK,
            &origin,
            GENERATE_METHODS,
            &json!({ "output": output }),
        ),
        Err(UpstreamError::Failed { status, detail }) => {
            log::warn!("chat completion failed: HTTP {} ({})", status, detail);
            json_response(
                StatusCode::BAD_GATEWAY,
                &origin,
                GENERATE_METHODS,
                &json!({ "error": "AI request failed", "status": status, "detail": detail }),
            )
        }
        Err(UpstreamError::TimedOut) => {
            log::warn!("chat completion timed out");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &origin,
                GENERATE_METHODS,
                "AI request timed out",
            )
        }
        Err(UpstreamError::Other(reason)) => {
            log::error!("chat completion error: {}", reason);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &origin,
                GENERATE_METHODS,
                "AI generation error",
            )
        }
    }
}

fn feed_response(origin: &str, body: &Value, cache_status: &str) -> HttpResponse {
    let mut builder = HttpResponse::build(StatusCode::OK);
    cors_headers(&mut builder, origin, FEED_METHODS);
    builder.insert_header(("X-Cache", cache_status));
    builder.json(body)
}

pub async fn feed(req: HttpRequest, state: web::Data<AppState>) -> HttpResponse {
    let origin = match guard::check(
        &req,
        &state.config,
        state.limiter.as_ref(),
        Method::GET,
        FEED_METHODS,
    ) {
        Access::Granted { origin } => origin,
        Access::Denied(response) => return response,
    };

    let (Some(bearer), Some(handle)) = (
        state.config.x_bearer_token.clone(),
        state.config.x_handle.clone(),
    ) else {
        return json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &origin,
            FEED_METHODS,
            "Server misconfigured",
        );
    };

    if let Some(payload) = state.feed_cache.get(state.config.feed_ttl) {
        return feed_response(&origin, &payload.to_response_json(true), "HIT");
    }

    let handle = handle.trim().to_string();
    if !valid_handle(&handle) {
        return json_error(
            StatusCode::BAD_REQUEST,
            &origin,
            FEED_METHODS,
            "Invalid configured handle",
        );
    }

    match state.fetch_feed(&bearer, &handle).await {
        Ok(payload) => {
            state.feed_cache.set(payload.clone());
            feed_response(&origin, &payload.to_response_json(false), "MISS")
        }
        Err(FeedError::UserLookup { status }) => json_response(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            &origin,
            FEED_METHODS,
            &json!({ "error": "X user lookup failed", "status": status }),
        ),
        Err(FeedError::MissingUserId) => json_error(
            StatusCode::BAD_GATEWAY,
            &origin,
            FEED_METHODS,
            "Missing user id from X",
        ),
        Err(FeedError::Timeline { status }) => json_response(
            StatusCode::BAD_GATEWAY,
            &origin,
            FEED_METHODS,
            &json!({ "error": "X timeline failed", "status": status }),
        ),
        Err(FeedError::Transport(reason)) => {
            log::error!("feed fetch error: {}", reason);
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                &origin,
                FEED_METHODS,
                "Server error",
            )
        }
    }
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/health").route(web::get().to(health)))
        .service(web::resource("/api/generate").route(web::route().to(generate)))
        .service(web::resource("/api/feed").route(web::route().to(feed)));
}

/// Sweeps expired rate windows once per window length.
pub async fn periodic_sweep(state: AppState) {
    let Some(limiter) = state.limiter.clone() else {
        return;
    };
    let window = state
        .config
        .rate_limit
        .as_ref()
        .map(|c| c.window)
        .unwrap_or_default()
        .max(Duration::from_secs(1));
    loop {
        tokio::time::sleep(window).await;
        let removed = limiter.sweep();
        if removed > 0 {
            log::debug!("rate limiter: swept {} expired windows", removed);
        }
    }
}

pub async fn startup(host: String, port: u16, state: AppState) -> std::io::Result<()> {
    let app_state = web::Data::new(state);

    println!("Starting server at {}:{}", host, port);

    // default level is info
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, log::LevelFilter::Info)
        .init();

    HttpServer::new(move || {
        App::new()
            .wrap(actix_web::middleware::Logger::default())
            .app_data(app_state.clone())
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}
