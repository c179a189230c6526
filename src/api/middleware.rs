//! API Middleware (Sessions, Rate Limiting, Logging)

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::handlers::AppState;
use crate::models::AppError;
use crate::utils::constants::{RATE_LIMIT_WINDOW_SECS, SESSION_COOKIE};

/// Rate limiter configuration
pub struct RateLimitConfig {
    /// Requests per window
    pub requests_per_window: u32,
    /// Window duration
    pub window_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 120,
            window_duration: Duration::from_secs(RATE_LIMIT_WINDOW_SECS),
        }
    }
}

/// Outcome of a rate limit check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_secs: u64,
}

/// Fixed-window limiter keyed by session subject or client IP
pub struct RateLimiter {
    /// key -> (requests in window, window start)
    requests: DashMap<String, (u32, Instant)>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            requests: DashMap::new(),
            config,
        }
    }

    pub fn per_minute(requests: u32) -> Self {
        Self::new(RateLimitConfig {
            requests_per_window: requests,
            ..Default::default()
        })
    }

    pub fn check(&self, key: &str) -> RateDecision {
        let now = Instant::now();
        let limit = self.config.requests_per_window;

        let mut entry = self.requests.entry(key.to_string()).or_insert((0, now));

        // Reset window if expired
        if now.duration_since(entry.1) >= self.config.window_duration {
            entry.0 = 0;
            entry.1 = now;
        }

        let reset_secs = self
            .config
            .window_duration
            .saturating_sub(now.duration_since(entry.1))
            .as_secs();

        if entry.0 >= limit {
            return RateDecision {
                allowed: false,
                limit,
                remaining: 0,
                reset_secs,
            };
        }

        entry.0 += 1;
        RateDecision {
            allowed: true,
            limit,
            remaining: limit - entry.0,
            reset_secs,
        }
    }

    /// Drop windows that ended long ago; returns removed entries
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.requests.len();
        self.requests.retain(|_, (_, started)| {
            now.duration_since(*started) < self.config.window_duration * 2
        });
        before - self.requests.len()
    }

    /// Background sweep of stale windows
    pub fn start_sweeper(self: &Arc<Self>) {
        let limiter = Arc::clone(self);
        let period = self.config.window_duration;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let removed = limiter.cleanup();
                if removed > 0 {
                    debug!("🧹 Rate limiter: {} stale windows removed", removed);
                }
            }
        });
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitConfig::default())
    }
}

fn is_health_path(path: &str) -> bool {
    path == "/health" || path == "/api/health"
}

/// Token from `Authorization: Bearer` or the session cookie
fn session_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if bearer.is_some() {
        return bearer;
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Decode the session and attach claims to the request.
///
/// Role and name are re-read from the store so demotions and deletions take
/// effect before the token expires.
pub async fn session_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = session_token(request.headers()) else {
        return next.run(request).await;
    };

    let mut claims = match state.sessions.verify(&token) {
        Ok(claims) => claims,
        Err(e) => return e.into_response(),
    };

    match state.store.users.get(&claims.sub) {
        Some(user) => {
            claims.role = user.role;
            claims.name = user.name;
            claims.email = user.email;
        }
        None => return AppError::invalid_session("Account no longer exists").into_response(),
    }

    request.extensions_mut().insert(claims);
    next.run(request).await
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    // Skip rate limiting for health check
    if is_health_path(request.uri().path()) {
        return next.run(request).await;
    }

    let rate_key = match request.extensions().get::<crate::core::SessionClaims>() {
        Some(claims) => format!("user:{}", claims.sub),
        None => {
            let headers = request.headers();
            let ip = headers
                .get("X-Forwarded-For")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .or_else(|| headers.get("X-Real-IP").and_then(|v| v.to_str().ok()))
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .unwrap_or("unknown");
            format!("ip:{}", ip)
        }
    };

    let decision = state.rate_limiter.check(&rate_key);

    let mut response = if decision.allowed {
        next.run(request).await
    } else {
        warn!(key = %rate_key, "Rate limit exceeded");
        let mut response = AppError::rate_limited(decision.reset_secs).into_response();
        response
            .headers_mut()
            .insert(header::RETRY_AFTER, HeaderValue::from(decision.reset_secs));
        response
    };

    // Add rate limit headers
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(decision.limit));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from(decision.remaining));
    headers.insert("X-RateLimit-Reset", HeaderValue::from(decision.reset_secs));

    response
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status();

    info!(
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        latency_ms = %latency.as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limiter_window() {
        let limiter = RateLimiter::per_minute(2);
        let first = limiter.check("ip:1.2.3.4");
        assert!(first.allowed);
        assert_eq!(first.remaining, 1);
        assert!(limiter.check("ip:1.2.3.4").allowed);

        let blocked = limiter.check("ip:1.2.3.4");
        assert!(!blocked.allowed);
        assert_eq!(blocked.remaining, 0);

        // Other keys have their own window
        assert!(limiter.check("ip:5.6.7.8").allowed);
        // Live windows survive a sweep
        assert_eq!(limiter.cleanup(), 0);
        assert!(!limiter.check("ip:1.2.3.4").allowed);
    }

    #[test]
    fn test_token_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        assert!(session_token(&headers).is_none());

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session-token=abc.def"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc.def"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz.123"));
        assert_eq!(session_token(&headers).as_deref(), Some("xyz.123"));
    }
}
