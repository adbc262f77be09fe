use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Fixed one-minute request window per client IP.
#[derive(Clone)]
pub struct RateLimiter {
    /// IP address -> (count, window_start)
    ip_minute: Arc<DashMap<String, (u32, DateTime<Utc>)>>,
    pub max_requests_per_ip_per_minute: u32,
}

impl RateLimiter {
    pub fn new(max_requests_per_ip_per_minute: u32) -> Self {
        Self {
            ip_minute: Arc::new(DashMap::new()),
            max_requests_per_ip_per_minute,
        }
    }

    /// Count one request for `ip`.
    /// Returns Ok(current_count) or Err(message) if over limit.
    pub fn check_ip_limit(&self, ip: &str) -> Result<u32, String> {
        self.check_ip_limit_at(ip, Utc::now())
    }

    fn check_ip_limit_at(&self, ip: &str, now: DateTime<Utc>) -> Result<u32, String> {
        let mut entry = self
            .ip_minute
            .entry(ip.to_string())
            .or_insert((0, now));

        // New window once 60 seconds have passed
        if (now - entry.1).num_seconds() >= 60 {
            entry.0 = 0;
            entry.1 = now;
        }

        if entry.0 >= self.max_requests_per_ip_per_minute {
            return Err(format!(
                "Rate limit exceeded: {} requests per minute. Please wait and try again.",
                self.max_requests_per_ip_per_minute
            ));
        }

        entry.0 += 1;
        Ok(entry.0)
    }

    /// Drop windows older than two minutes. Called from a background task.
    pub fn cleanup_stale_entries(&self) {
        let now = Utc::now();
        self.ip_minute
            .retain(|_, (_, window_start)| (now - *window_start).num_seconds() < 120);
    }

    pub fn tracked_ips(&self) -> usize {
        self.ip_minute.len()
    }
}

/// First `x-forwarded-for` hop when behind a proxy, else the socket peer
pub fn client_ip(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(String::from)
        .unwrap_or_else(|| peer.ip().to_string())
}
