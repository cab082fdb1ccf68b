//! Admission control for outbound requests
//!
//! This module bounds two things independently:
//! - How many permits are granted within any rolling interval (request rate)
//! - How many permits are outstanding at once (in-flight requests)
//!
//! A caller that would have to wait longer than the configured maximum delay
//! is rejected instead of queuing without bound.

use crate::config::CrawlerConfig;
use crate::FeedError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

/// Authorizes one outbound request; the concurrency slot is released on drop
#[derive(Debug)]
pub struct Permit {
    _slot: OwnedSemaphorePermit,
}

/// Global rate and concurrency gate shared by every crawl
#[derive(Debug)]
pub struct RateLimiter {
    /// Permits granted per interval
    rate: usize,

    /// Length of the rolling window
    interval: Duration,

    /// Longest a caller may wait before being rejected
    max_delay: Duration,

    /// Bounds permits outstanding at once
    concurrency: Arc<Semaphore>,

    /// Grant instants within the current window, oldest first
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter granting `rate` permits per second with at most
    /// `concurrency` outstanding
    pub fn new(rate: u32, concurrency: usize, max_delay: Duration) -> Self {
        Self::with_interval(rate, concurrency, max_delay, Duration::from_secs(1))
    }

    /// Creates a limiter with a custom rolling window length
    pub fn with_interval(
        rate: u32,
        concurrency: usize,
        max_delay: Duration,
        interval: Duration,
    ) -> Self {
        let rate = (rate as usize).max(1);
        Self {
            rate,
            interval,
            max_delay,
            concurrency: Arc::new(Semaphore::new(concurrency.max(1))),
            grants: Mutex::new(VecDeque::with_capacity(rate)),
        }
    }

    /// Builds a limiter from the crawler configuration
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(
            config.requests_per_second,
            config.concurrency_cap(),
            config.max_delay(),
        )
    }

    /// Waits for a permit
    ///
    /// This method:
    /// 1. Waits for a free concurrency slot, up to the maximum delay
    /// 2. Waits until the rolling window has room for another grant
    /// 3. Rejects as soon as it knows the wait would exceed the maximum delay
    ///
    /// # Returns
    ///
    /// * `Ok(Permit)` - The request may proceed; drop the permit when done
    /// * `Err(FeedError::RateLimitRejection)` - The wait would exceed the maximum delay
    pub async fn acquire(&self) -> Result<Permit, FeedError> {
        let started = Instant::now();
        let give_up_at = started + self.max_delay;

        let slot = match tokio::time::timeout_at(
            give_up_at,
            Arc::clone(&self.concurrency).acquire_owned(),
        )
        .await
        {
            Ok(Ok(slot)) => slot,
            // The semaphore is never closed; treat it like saturation anyway.
            Ok(Err(_)) | Err(_) => {
                return Err(FeedError::RateLimitRejection {
                    waited: started.elapsed(),
                })
            }
        };

        loop {
            let next_free = {
                let now = Instant::now();
                let mut grants = self.grants.lock().unwrap_or_else(PoisonError::into_inner);
                while grants
                    .front()
                    .is_some_and(|granted| now.duration_since(*granted) >= self.interval)
                {
                    grants.pop_front();
                }

                if grants.len() < self.rate {
                    grants.push_back(now);
                    tracing::trace!(
                        "Permit granted after {:?} ({} in window)",
                        now.duration_since(started),
                        grants.len()
                    );
                    return Ok(Permit { _slot: slot });
                }

                // Full window: the oldest grant leaves it first.
                match grants.front() {
                    Some(oldest) => *oldest + self.interval,
                    None => now,
                }
            };

            if next_free > give_up_at {
                tracing::debug!(
                    "Rejecting permit request: next slot in {:?} exceeds max delay {:?}",
                    next_free.saturating_duration_since(started),
                    self.max_delay
                );
                return Err(FeedError::RateLimitRejection {
                    waited: started.elapsed(),
                });
            }

            tokio::time::sleep_until(next_free).await;
        }
    }

    /// Number of concurrency slots currently free
    pub fn available_permits(&self) -> usize {
        self.concurrency.available_permits()
    }

    /// Permits granted per interval
    pub fn rate(&self) -> usize {
        self.rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_grants_up_to_rate_immediately() {
        let limiter = RateLimiter::new(3, 10, Duration::from_secs(5));
        let start = Instant::now();

        let mut permits = Vec::new();
        for _ in 0..3 {
            permits.push(limiter.acquire().await.unwrap());
        }

        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(limiter.available_permits(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window_to_roll() {
        let limiter = RateLimiter::new(2, 10, Duration::from_secs(5));
        let start = Instant::now();

        drop(limiter.acquire().await.unwrap());
        drop(limiter.acquire().await.unwrap());
        drop(limiter.acquire().await.unwrap());

        assert!(start.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_window_exceeds_rate() {
        let limiter = Arc::new(RateLimiter::new(4, 100, Duration::from_secs(60)));
        let grants = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let grants = Arc::clone(&grants);
                tokio::spawn(async move {
                    let _permit = limiter.acquire().await.unwrap();
                    grants.lock().unwrap().push(Instant::now());
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let mut grants = grants.lock().unwrap().clone();
        grants.sort();
        assert_eq!(grants.len(), 20);
        for (i, granted) in grants.iter().enumerate() {
            let in_window = grants[i..]
                .iter()
                .take_while(|later| later.duration_since(*granted) < Duration::from_secs(1))
                .count();
            assert!(in_window <= 4, "{} grants within one second", in_window);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let limiter = Arc::new(RateLimiter::new(100, 3, Duration::from_secs(60)));
        let outstanding = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..12)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                let outstanding = Arc::clone(&outstanding);
                let peak = Arc::clone(&peak);
                tokio::spawn(async move {
                    let _permit = limiter.acquire().await.unwrap();
                    let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    outstanding.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.available_permits(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_when_rate_wait_exceeds_max_delay() {
        let limiter = RateLimiter::new(1, 10, Duration::from_millis(200));

        let _first = limiter.acquire().await.unwrap();
        let start = Instant::now();
        let result = limiter.acquire().await;

        assert!(matches!(result, Err(FeedError::RateLimitRejection { .. })));
        // Rejected up front rather than after sleeping
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejects_when_concurrency_wait_exceeds_max_delay() {
        let limiter = RateLimiter::new(100, 1, Duration::from_millis(300));

        let _held = limiter.acquire().await.unwrap();
        let start = Instant::now();
        let result = limiter.acquire().await;

        assert!(matches!(result, Err(FeedError::RateLimitRejection { .. })));
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_released_slot_is_reused() {
        let limiter = RateLimiter::new(100, 1, Duration::from_secs(1));

        let first = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available_permits(), 0);
        drop(first);
        assert_eq!(limiter.available_permits(), 1);

        assert!(limiter.acquire().await.is_ok());
    }

    #[test]
    fn test_from_config() {
        let config = CrawlerConfig {
            requests_per_second: 5,
            concurrency_multiplier: 1.2,
            ..CrawlerConfig::default()
        };
        let limiter = RateLimiter::from_config(&config);
        assert_eq!(limiter.rate(), 5);
        assert_eq!(limiter.available_permits(), 6);
    }
}
