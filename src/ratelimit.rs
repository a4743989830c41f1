//! Per-client request ceilings.
//!
//! Each client gets a 60-second and a 3600-second window. A window starts
//! with the first request after it expired and resets once more than its
//! length has elapsed. The check and the increment happen under one lock, so two
//! concurrent requests from the same client can never both pass a check that
//! should have denied the second.
//!
//! The store is bounded: when a new client would exceed `max_clients`,
//! entries idle for longer than the hour window are purged first (both of
//! their windows have expired, so nothing is lost), then the least recently
//! seen client is evicted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::RateLimitConfig;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3600);

/// One counting window.
#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

impl Window {
    const fn new(now: Instant) -> Self {
        Self {
            started: now,
            count: 0,
        }
    }

    fn roll(&mut self, now: Instant, length: Duration) {
        if now.saturating_duration_since(self.started) > length {
            *self = Self::new(now);
        }
    }
}

/// Counters for one client.
#[derive(Debug, Clone, Copy)]
struct RateWindowState {
    minute: Window,
    hour: Window,
    last_seen: Instant,
}

impl RateWindowState {
    const fn new(now: Instant) -> Self {
        Self {
            minute: Window::new(now),
            hour: Window::new(now),
            last_seen: now,
        }
    }
}

/// Shared per-client request limiter.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    clients: Mutex<HashMap<String, RateWindowState>>,
}

impl RateLimiter {
    /// Creates a limiter with the given ceilings.
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Configured ceilings.
    #[must_use]
    pub const fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Records one request from `client` if both ceilings allow it.
    ///
    /// Returns `false` without counting anything when either window is full.
    pub fn check_and_consume(&self, client: &str) -> bool {
        self.check_and_consume_at(client, Instant::now())
    }

    /// [`Self::check_and_consume`] against an explicit clock reading.
    pub fn check_and_consume_at(&self, client: &str, now: Instant) -> bool {
        let mut clients = self.clients.lock();

        if !clients.contains_key(client) && clients.len() >= self.config.max_clients {
            evict(&mut clients, now, self.config.max_clients);
        }

        let state = clients
            .entry(client.to_string())
            .or_insert_with(|| RateWindowState::new(now));

        state.minute.roll(now, MINUTE);
        state.hour.roll(now, HOUR);
        state.last_seen = now;

        if state.minute.count >= self.config.per_minute || state.hour.count >= self.config.per_hour {
            tracing::debug!(client, "Rate limit reached");
            return false;
        }

        state.minute.count += 1;
        state.hour.count += 1;
        true
    }

    /// Number of clients currently tracked.
    #[must_use]
    pub fn tracked_clients(&self) -> usize {
        self.clients.lock().len()
    }
}

fn evict(clients: &mut HashMap<String, RateWindowState>, now: Instant, max_clients: usize) {
    clients.retain(|_, state| now.saturating_duration_since(state.last_seen) < HOUR);

    while clients.len() >= max_clients {
        let Some(oldest) = clients
            .iter()
            .min_by_key(|(_, state)| state.last_seen)
            .map(|(id, _)| id.clone())
        else {
            break;
        };
        tracing::debug!(client = %oldest, "Evicting rate limit state");
        clients.remove(&oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(per_minute: u32, per_hour: u32, max_clients: usize) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            per_minute,
            per_hour,
            max_clients,
        })
    }

    #[test]
    fn minute_ceiling() {
        let limiter = limiter(2, 100, 10);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("a", now));
        assert!(limiter.check_and_consume_at("a", now + Duration::from_secs(1)));
        assert!(!limiter.check_and_consume_at("a", now + Duration::from_secs(2)));
    }

    #[test]
    fn clients_are_independent() {
        let limiter = limiter(1, 100, 10);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("a", now));
        assert!(!limiter.check_and_consume_at("a", now));
        assert!(limiter.check_and_consume_at("b", now));
    }

    #[test]
    fn minute_window_rolls_over() {
        let limiter = limiter(1, 100, 10);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("a", now));
        assert!(!limiter.check_and_consume_at("a", now + Duration::from_secs(59)));
        assert!(!limiter.check_and_consume_at("a", now + Duration::from_secs(60)));
        assert!(limiter.check_and_consume_at("a", now + Duration::from_secs(61)));
    }

    #[test]
    fn hour_ceiling_survives_minute_rollover() {
        let limiter = limiter(2, 3, 10);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("a", now));
        assert!(limiter.check_and_consume_at("a", now));
        assert!(!limiter.check_and_consume_at("a", now));

        let later = now + Duration::from_secs(61);
        assert!(limiter.check_and_consume_at("a", later));
        assert!(!limiter.check_and_consume_at("a", later));

        let next_hour = now + Duration::from_secs(3601);
        assert!(limiter.check_and_consume_at("a", next_hour));
    }

    #[test]
    fn denied_requests_are_not_counted() {
        let limiter = limiter(1, 2, 10);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("a", now));
        for _ in 0..5 {
            assert!(!limiter.check_and_consume_at("a", now));
        }
        // Only one request counted against the hour, so one more fits
        assert!(limiter.check_and_consume_at("a", now + Duration::from_secs(61)));
    }

    #[test]
    fn least_recently_seen_client_is_evicted() {
        let limiter = limiter(1, 100, 2);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("a", now));
        assert!(limiter.check_and_consume_at("b", now + Duration::from_secs(1)));
        assert!(limiter.check_and_consume_at("c", now + Duration::from_secs(2)));
        assert_eq!(limiter.tracked_clients(), 2);

        // "a" was evicted, so it starts from a fresh window
        assert!(limiter.check_and_consume_at("a", now + Duration::from_secs(3)));
        // "c" is still tracked and still at its ceiling
        assert!(!limiter.check_and_consume_at("c", now + Duration::from_secs(4)));
    }

    #[test]
    fn idle_clients_are_purged_first() {
        let limiter = limiter(5, 100, 3);
        let now = Instant::now();
        assert!(limiter.check_and_consume_at("old-1", now));
        assert!(limiter.check_and_consume_at("old-2", now));
        assert!(limiter.check_and_consume_at("recent", now + Duration::from_secs(3000)));

        assert!(limiter.check_and_consume_at("new", now + Duration::from_secs(3700)));
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn concurrent_requests_never_exceed_the_ceiling() {
        let limiter = std::sync::Arc::new(limiter(5, 100, 10));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = std::sync::Arc::clone(&limiter);
                std::thread::spawn(move || limiter.check_and_consume("same"))
            })
            .collect();

        let allowed = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 5);
    }
}
