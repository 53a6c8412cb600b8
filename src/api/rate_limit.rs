use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::error::ApiError;
use crate::app::AppState;


const SWEEP_EVERY: u64 = 256;


#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per client IP.
///
/// Windows older than the window length are swept every few hundred requests,
/// which keeps the table bounded by the number of recently active clients.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    windows: Mutex<HashMap<IpAddr, Window>>,
    request_count: AtomicU64,
}

impl RateLimiter {
    #[must_use]
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            windows: Mutex::new(HashMap::new()),
            request_count: AtomicU64::new(0),
        }
    }


    pub fn per_minute(max_requests: u32) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Counts the request and reports whether it is within the limit.
    pub fn check(&self, ip: IpAddr) -> bool {
        self.check_at(ip, Instant::now())
    }

    fn check_at(&self, ip: IpAddr, now: Instant) -> bool {
        let seen = self.request_count.fetch_add(1, Ordering::Relaxed);
        if seen > 0 && seen % SWEEP_EVERY == 0 {
            self.sweep_at(now);
        }

        let mut windows = self.windows.lock();
        let window = windows.entry(ip).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(window.started) > self.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }
        window.count = window.count.saturating_add(1);

        if window.count > self.max_requests {
            warn!("Rate limit exceeded for {} ({} requests)", ip, window.count);
            return false;
        }
        true
    }

    /// Drops windows that have run out; returns how many were removed.
    fn sweep_at(&self, now: Instant) -> usize {
        let mut windows = self.windows.lock();
        let before = windows.len();
        windows.retain(|_, w| now.duration_since(w.started) <= self.window);
        let removed = before - windows.len();
        if removed > 0 {
            debug!("Swept {} stale rate limit windows", removed);
        }
        removed
    }
}

/// Middleware; requests without a known peer address are not limited.
pub async fn limit_by_ip(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    if let Some(ip) = peer {
        if !state.rate_limiter.check(ip) {
            return Err(ApiError::RateLimited);
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const A: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
    const B: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

    #[test]
    fn test_limit_per_ip() {
        let limiter = RateLimiter::per_minute(3);
        let now = Instant::now();
        assert!((0..3).all(|_| limiter.check_at(A, now)));
        assert!(!limiter.check_at(A, now));
        assert!(limiter.check_at(B, now));
    }

    #[test]
    fn test_window_resets() {
        let limiter = RateLimiter::new(1, Duration::from_millis(100));
        let start = Instant::now();
        assert!(limiter.check_at(A, start));
        assert!(!limiter.check_at(A, start));
        assert!(limiter.check_at(A, start + Duration::from_millis(150)));
    }

    #[test]
    fn test_sweep_removes_stale_windows() {
        let limiter = RateLimiter::new(10, Duration::from_millis(100));
        let start = Instant::now();
        limiter.check_at(A, start);
        limiter.check_at(B, start + Duration::from_millis(80));

        assert_eq!(limiter.sweep_at(start + Duration::from_millis(150)), 1);
        assert_eq!(limiter.windows.lock().len(), 1);
    }
}
