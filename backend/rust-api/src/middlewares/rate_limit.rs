use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use redis::aio::ConnectionManager;
use std::net::SocketAddr;
use std::sync::Arc;

use super::auth::resolve_identity;
use crate::services::AppState;

// Payment routes: order issuance and verification
const PAYMENT_RATE_LIMIT_PER_IDENTITY: u32 = 20; // requests per window
const PAYMENT_RATE_LIMIT_PER_IP: u32 = 60; // requests per window
const PAYMENT_RATE_WINDOW_SECONDS: u64 = 300; // 5 minutes

fn extract_client_ip_from(headers: &HeaderMap, extensions: &axum::http::Extensions) -> String {
    // Preferred order: X-Forwarded-For, Forwarded, X-Real-IP, ConnectInfo
    if let Some(v) = headers.get("x-forwarded-for") {
        if let Ok(s) = v.to_str() {
            // x-forwarded-for can be a comma separated list; take first
            return s.split(',').next().unwrap_or(s).trim().to_string();
        }
    }

    if let Some(v) = headers.get("forwarded") {
        if let Ok(s) = v.to_str() {
            // forwarded: for=1.2.3.4; proto=http; by=...
            for part in s.split(';') {
                let p = part.trim();
                if let Some(val) = p.strip_prefix("for=") {
                    return val.trim().trim_matches('\"').to_string();
                }
            }
        }
    }

    if let Some(v) = headers.get("x-real-ip") {
        if let Ok(s) = v.to_str() {
            return s.trim().to_string();
        }
    }

    if let Some(ci) = extensions.get::<ConnectInfo<SocketAddr>>() {
        return ci.0.ip().to_string();
    }

    "unknown".to_string()
}

fn limit_from_env(name: &str, default: u32) -> u32 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .unwrap_or(default)
}

/// Fixed-window limiter for the payment routes, keyed by identity and by client IP.
/// Passes everything through when Redis is not configured or `RATE_LIMIT_DISABLED=1`.
pub async fn payment_rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(redis) = state.redis.as_ref() else {
        return Ok(next.run(request).await);
    };

    if std::env::var("RATE_LIMIT_DISABLED").unwrap_or_default() == "1" {
        tracing::debug!("Rate limiting disabled via RATE_LIMIT_DISABLED=1");
        return Ok(next.run(request).await);
    }

    let client_ip = extract_client_ip_from(request.headers(), request.extensions());

    // Unresolvable identities are left to the handler to reject
    let identity_key = resolve_identity(
        request.headers(),
        &state.jwt,
        state.config.quiz.allow_guests,
    )
    .ok()
    .map(|identity| identity.key());

    if let Some(key) = &identity_key {
        let limit = limit_from_env(
            "RATE_LIMIT_PAYMENT_PER_IDENTITY",
            PAYMENT_RATE_LIMIT_PER_IDENTITY,
        );
        enforce(redis, &format!("ratelimit:payment:id:{}", key), limit).await?;
    }

    let ip_limit = limit_from_env("RATE_LIMIT_PAYMENT_PER_IP", PAYMENT_RATE_LIMIT_PER_IP);
    enforce(
        redis,
        &format!("ratelimit:payment:ip:{}", client_ip),
        ip_limit,
    )
    .await?;

    Ok(next.run(request).await)
}

async fn enforce(redis: &ConnectionManager, key: &str, limit: u32) -> Result<(), StatusCode> {
    let allowed = check_rate_limit_with_window(redis, key, limit, PAYMENT_RATE_WINDOW_SECONDS)
        .await
        .map_err(|e| {
            tracing::error!("Rate limit check failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    if !allowed {
        tracing::warn!("Rate limit exceeded for {}", key);
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    Ok(())
}

/// Check rate limit using Redis with Lua script for atomicity
async fn check_rate_limit_with_window(
    redis: &ConnectionManager,
    key: &str,
    limit: u32,
    window_seconds: u64,
) -> anyhow::Result<bool> {
    let mut conn = redis.clone();

    let lua_script = r#"
        local key = KEYS[1]
        local limit = tonumber(ARGV[1])
        local window = tonumber(ARGV[2])

        local current = redis.call('GET', key)

        if current == false then
            redis.call('SET', key, 1, 'EX', window)
            return 1
        end

        current = tonumber(current)

        if current >= limit then
            return 0
        end

        redis.call('INCR', key)
        return 1
    "#;

    let allowed: u32 = redis::Script::new(lua_script)
        .key(key)
        .arg(limit)
        .arg(window_seconds)
        .invoke_async(&mut conn)
        .await?;

    Ok(allowed == 1)
}
