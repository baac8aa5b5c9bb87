// src/services/rate_limiter.rs
use log::{debug, warn};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::config::RateLimitConfig;

/// Sliding-window throttle shared by every market-cap worker.
///
/// Enforces a short burst cap and a per-minute cap at the same time. Callers
/// over either limit wait (never fail) until a slot frees up. Construct one
/// and hand it to every worker behind an `Arc`.
#[derive(Debug)]
pub struct RateLimiter {
    request_times: Mutex<VecDeque<Instant>>,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Caps below one are raised to one.
    pub fn new(mut config: RateLimitConfig) -> Self {
        config.burst_size = config.burst_size.max(1);
        config.max_requests_per_minute = config.max_requests_per_minute.max(1);
        RateLimiter {
            request_times: Mutex::new(VecDeque::new()),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Waits until a request is allowed and records it. Returns the instant
    /// the request was granted.
    pub async fn acquire(&self) -> Instant {
        loop {
            let wait = {
                let mut times = self.request_times.lock().await;
                let now = Instant::now();

                while times
                    .front()
                    .map_or(false, |&t| now.duration_since(t) >= self.config.minute_window)
                {
                    times.pop_front();
                }

                match self.required_wait(&times, now) {
                    None => {
                        times.push_back(now);
                        return now;
                    }
                    Some(wait) => wait,
                }
            };

            // lock is released while sleeping so other workers can re-check
            sleep(wait).await;
        }
    }

    fn required_wait(&self, times: &VecDeque<Instant>, now: Instant) -> Option<Duration> {
        let burst = self.config.burst_size;
        let recent = times
            .iter()
            .filter(|&&t| now.duration_since(t) < self.config.burst_window)
            .count();

        if recent >= burst {
            // the oldest request that must expire before another fits in the burst window
            let blocking = times[times.len() - burst];
            let wait = self.config.burst_window - now.duration_since(blocking);
            debug!("Burst limit reached, waiting {:.1}s", wait.as_secs_f64());
            return Some(wait);
        }

        if times.len() >= self.config.max_requests_per_minute {
            let blocking = times[times.len() - self.config.max_requests_per_minute];
            let wait = self.config.minute_window - now.duration_since(blocking);
            warn!("Rate limit reached. Pausing {:.1}s", wait.as_secs_f64());
            return Some(wait);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter(burst_size: usize, per_minute: usize) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(RateLimitConfig {
            max_requests_per_minute: per_minute,
            burst_size,
            ..RateLimitConfig::default()
        }))
    }

    fn max_in_window(grants: &[Instant], window: Duration) -> usize {
        grants
            .iter()
            .map(|&start| grants.iter().filter(|&&t| t >= start && t < start + window).count())
            .max()
            .unwrap_or(0)
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_burst_or_minute_caps() {
        let limiter = limiter(3, 5);
        let mut handles = Vec::new();
        for _ in 0..17 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move { limiter.acquire().await }));
        }

        let mut grants = Vec::new();
        for handle in handles {
            grants.push(handle.await.unwrap());
        }
        grants.sort();

        assert_eq!(grants.len(), 17);
        assert!(max_in_window(&grants, Duration::from_secs(10)) <= 3);
        assert!(max_in_window(&grants, Duration::from_secs(60)) <= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn burst_cap_delays_the_next_request() {
        let limiter = limiter(2, 100);
        let start = Instant::now();
        limiter.acquire().await;
        limiter.acquire().await;
        let third = limiter.acquire().await;
        assert!(third.duration_since(start) >= Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn requests_under_the_caps_are_immediate() {
        let limiter = limiter(8, 25);
        let start = Instant::now();
        for _ in 0..8 {
            limiter.acquire().await;
        }
        assert_eq!(Instant::now(), start);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_caps_act_as_one() {
        let limiter = limiter(0, 0);
        assert_eq!(limiter.config().burst_size, 1);
        assert_eq!(limiter.config().max_requests_per_minute, 1);

        let start = Instant::now();
        limiter.acquire().await;
        let second = limiter.acquire().await;
        assert!(second.duration_since(start) >= Duration::from_secs(60));
    }
}
