use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::HttpRequest;
use dashmap::DashMap;

use crate::config::RateLimitConfig;
use crate::error::ApiError;

/// Sliding window in-memory rate limiter (process local).
#[derive(Clone, Default)]
pub struct InMemoryRateLimiter {
    store: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if allowed, false if limited.
    pub fn check(&self, key: &str, limit: usize, window: Duration) -> bool {
        let now = Instant::now();
        let mut entry = self.store.entry(key.to_string()).or_default();
        while let Some(front) = entry.front() {
            if now.duration_since(*front) >= window {
                entry.pop_front();
            } else {
                break;
            }
        }
        if entry.len() < limit {
            entry.push_back(now);
            true
        } else {
            false
        }
    }
}

/// What a request is trying to do, for limiting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Post,
    Comment,
    Login,
    Media,
}

impl Action {
    fn key(self) -> &'static str {
        match self {
            Action::Post => "post",
            Action::Comment => "comment",
            Action::Login => "login",
            Action::Media => "media",
        }
    }
}

/// High level guard used by handlers.
#[derive(Clone)]
pub struct RateLimiterFacade {
    pub limiter: InMemoryRateLimiter,
    pub cfg: RateLimitConfig,
}

impl RateLimiterFacade {
    pub fn new(limiter: InMemoryRateLimiter, cfg: RateLimitConfig) -> Self {
        Self { limiter, cfg }
    }

    pub fn allow(&self, action: Action, ip: &str) -> bool {
        let (limit, window) = match action {
            Action::Post => (self.cfg.post_limit, self.cfg.post_window),
            Action::Comment => (self.cfg.comment_limit, self.cfg.comment_window),
            Action::Login => (self.cfg.login_limit, self.cfg.login_window),
            Action::Media => (self.cfg.media_limit, self.cfg.media_window),
        };
        self.limiter.check(&format!("{}:{ip}", action.key()), limit, window)
    }

    /// `TooManyRequests` once the caller's IP has used up its window.
    pub fn guard(&self, action: Action, req: &HttpRequest) -> Result<(), ApiError> {
        let ip = req.connection_info().realip_remote_addr().unwrap_or("unknown").to_string();
        if self.allow(action, &ip) {
            Ok(())
        } else {
            tracing::warn!(action = action.key(), %ip, "rate limited");
            metrics::counter!("eco_rate_limited_total", "action" => action.key()).increment(1);
            Err(ApiError::TooManyRequests)
        }
    }
}
