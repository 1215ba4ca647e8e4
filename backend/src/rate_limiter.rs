use std::collections::HashMap;
use std::sync::Mutex;
use time::{OffsetDateTime, Duration};
use tracing::{warn, error};

#[derive(Debug)]
struct Window {
    attempts: u32,
    started: OffsetDateTime,
}

/// Fixed-window limiter keyed by an arbitrary client key.
#[derive(Debug)]
pub struct RateLimiter {
    windows: Mutex<HashMap<String, Window>>,
    max_attempts: u32,
    window: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimited {
    pub retry_after_secs: i64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, 1)
    }
}

impl RateLimiter {
    pub fn new(max_attempts: u32, window_minutes: i64) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_attempts,
            window: Duration::minutes(window_minutes.max(1)),
        }
    }

    pub fn check(&self, key: &str) -> Result<(), RateLimited> {
        self.check_at(key, OffsetDateTime::now_utc())
    }

    pub fn check_at(&self, key: &str, now: OffsetDateTime) -> Result<(), RateLimited> {
        let mut windows = match self.windows.lock() {
            Ok(guard) => guard,
            Err(e) => {
                // A limiter failure must not block voting.
                error!("Failed to acquire rate limit lock: {}", e);
                return Ok(());
            }
        };

        windows.retain(|_, w| now - w.started <= self.window * 2);

        let window = windows.entry(key.to_string()).or_insert(Window { attempts: 0, started: now });
        if now - window.started > self.window {
            *window = Window { attempts: 0, started: now };
        }

        if window.attempts >= self.max_attempts {
            let retry_after_secs = (window.started + self.window - now).whole_seconds().max(1);
            warn!("Rate limit triggered for key {}, retry in {}s", key, retry_after_secs);
            return Err(RateLimited { retry_after_secs });
        }

        window.attempts += 1;
        Ok(())
    }
}
