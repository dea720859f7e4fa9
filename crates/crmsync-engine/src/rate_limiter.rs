//! Client-side rate limiting per platform.
//!
//! Each platform gets fixed windows for minute, hour, and day quotas
//! plus a burst token bucket refilled one token per second. A check
//! either consumes one slot in every window or none of them; the
//! decision happens under a single lock with no await points, so
//! concurrent tasks cannot split a half-consumed check.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crmsync_adapter::CrmPlatform;

use crate::error::SyncError;

/// Quota configuration for one platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests_per_minute: u32,
    pub requests_per_hour: u32,
    pub requests_per_day: u32,
    /// Burst bucket capacity; one token returns per elapsed second.
    pub burst_limit: u32,
    /// Baseline retry hint when a window is exhausted, in milliseconds.
    pub retry_after_ms: u64,
}

impl RateLimitConfig {
    /// Published quota defaults per platform, kept conservative.
    #[must_use]
    pub fn defaults_for(platform: CrmPlatform) -> Self {
        match platform {
            CrmPlatform::HubSpot => Self {
                requests_per_minute: 100,
                requests_per_hour: 6_000,
                requests_per_day: 250_000,
                burst_limit: 10,
                retry_after_ms: 1_000,
            },
            CrmPlatform::Salesforce => Self {
                requests_per_minute: 100,
                requests_per_hour: 5_000,
                requests_per_day: 100_000,
                burst_limit: 25,
                retry_after_ms: 1_000,
            },
            CrmPlatform::Zoho => Self {
                requests_per_minute: 60,
                requests_per_hour: 2_000,
                requests_per_day: 25_000,
                burst_limit: 10,
                retry_after_ms: 2_000,
            },
            CrmPlatform::Pipedrive => Self {
                requests_per_minute: 80,
                requests_per_hour: 4_000,
                requests_per_day: 50_000,
                burst_limit: 10,
                retry_after_ms: 1_000,
            },
            CrmPlatform::Dynamics => Self {
                requests_per_minute: 300,
                requests_per_hour: 6_000,
                requests_per_day: 60_000,
                burst_limit: 20,
                retry_after_ms: 1_000,
            },
            CrmPlatform::SugarCrm => Self {
                requests_per_minute: 60,
                requests_per_hour: 2_000,
                requests_per_day: 20_000,
                burst_limit: 10,
                retry_after_ms: 2_000,
            },
        }
    }
}

/// Quota window that exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitWindow {
    Burst,
    Minute,
    Hour,
    Day,
}

impl LimitWindow {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            LimitWindow::Burst => "burst",
            LimitWindow::Minute => "minute",
            LimitWindow::Hour => "hour",
            LimitWindow::Day => "day",
        }
    }
}

/// A rejected check, with how long to wait before retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitExceeded {
    pub platform: CrmPlatform,
    pub window: LimitWindow,
    pub wait: Duration,
}

impl From<RateLimitExceeded> for SyncError {
    fn from(exceeded: RateLimitExceeded) -> Self {
        SyncError::rate_limited(
            exceeded.platform,
            format!("{} quota exhausted", exceeded.window.as_str()),
            Some(exceeded.wait.as_millis() as u64),
        )
    }
}

/// Fixed window: count since the window opened.
#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    opened: Instant,
    count: u32,
}

impl WindowCounter {
    fn new(now: Instant) -> Self {
        Self {
            opened: now,
            count: 0,
        }
    }

    fn roll(&mut self, now: Instant, length: Duration) {
        if now.duration_since(self.opened) >= length {
            self.opened = now;
            self.count = 0;
        }
    }

    fn remaining(&self, now: Instant, length: Duration) -> Duration {
        length.saturating_sub(now.duration_since(self.opened))
    }
}

#[derive(Debug)]
struct LimiterState {
    /// Burst tokens remaining; refilled one per elapsed second.
    burst_tokens: u32,
    last_refill: Instant,
    minute: WindowCounter,
    hour: WindowCounter,
    day: WindowCounter,
}

const MINUTE_LEN: Duration = Duration::from_secs(60);
const HOUR_LEN: Duration = Duration::from_secs(3_600);
const DAY_LEN: Duration = Duration::from_secs(86_400);

/// Rate limiter for a single platform.
#[derive(Debug)]
pub struct PlatformLimiter {
    platform: CrmPlatform,
    config: RateLimitConfig,
    state: Mutex<LimiterState>,
}

impl PlatformLimiter {
    #[must_use]
    pub fn new(platform: CrmPlatform, config: RateLimitConfig) -> Self {
        let now = Instant::now();
        Self {
            platform,
            config,
            state: Mutex::new(LimiterState {
                burst_tokens: config.burst_limit,
                last_refill: now,
                minute: WindowCounter::new(now),
                hour: WindowCounter::new(now),
                day: WindowCounter::new(now),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Consume one request slot, or report which window is exhausted.
    pub fn check_limit(&self) -> std::result::Result<(), RateLimitExceeded> {
        self.check_at(Instant::now())
    }

    /// Same as [`check_limit`](Self::check_limit) with an injected
    /// clock, so window behavior is testable without sleeping.
    pub fn check_at(&self, now: Instant) -> std::result::Result<(), RateLimitExceeded> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            // A poisoned lock still holds valid counters.
            Err(poisoned) => poisoned.into_inner(),
        };

        state.minute.roll(now, MINUTE_LEN);
        state.hour.roll(now, HOUR_LEN);
        state.day.roll(now, DAY_LEN);

        // One burst token back per whole elapsed second, capped.
        let elapsed_secs = now.duration_since(state.last_refill).as_secs();
        if elapsed_secs > 0 {
            state.burst_tokens = state
                .burst_tokens
                .saturating_add(u32::try_from(elapsed_secs).unwrap_or(u32::MAX))
                .min(self.config.burst_limit);
            state.last_refill += Duration::from_secs(elapsed_secs);
        }

        let checks = [
            (LimitWindow::Day, state.day.count, self.config.requests_per_day, state.day.remaining(now, DAY_LEN)),
            (LimitWindow::Hour, state.hour.count, self.config.requests_per_hour, state.hour.remaining(now, HOUR_LEN)),
            (LimitWindow::Minute, state.minute.count, self.config.requests_per_minute, state.minute.remaining(now, MINUTE_LEN)),
        ];
        // Report the tightest violated window; nothing is consumed on
        // rejection.
        let mut violation: Option<(LimitWindow, Duration)> = None;
        for (window, count, limit, remaining) in checks {
            if count >= limit {
                violation = Some((window, remaining));
            }
        }
        if let Some((window, remaining)) = violation {
            let floor = Duration::from_millis(self.config.retry_after_ms);
            return Err(RateLimitExceeded {
                platform: self.platform,
                window,
                wait: remaining.max(floor).min(DAY_LEN),
            });
        }
        if state.burst_tokens == 0 {
            return Err(RateLimitExceeded {
                platform: self.platform,
                window: LimitWindow::Burst,
                wait: Duration::from_millis(self.config.retry_after_ms),
            });
        }

        state.burst_tokens -= 1;
        state.minute.count += 1;
        state.hour.count += 1;
        state.day.count += 1;
        Ok(())
    }
}

/// Limiters for every platform, keyed by platform.
#[derive(Debug)]
pub struct RateLimiterRegistry {
    limiters: HashMap<CrmPlatform, PlatformLimiter>,
}

impl RateLimiterRegistry {
    /// Build with the published defaults for every platform.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut limiters = HashMap::new();
        for &platform in CrmPlatform::all() {
            limiters.insert(
                platform,
                PlatformLimiter::new(platform, RateLimitConfig::defaults_for(platform)),
            );
        }
        Self { limiters }
    }

    /// Replace the quota configuration for one platform.
    pub fn set_config(&mut self, platform: CrmPlatform, config: RateLimitConfig) {
        self.limiters
            .insert(platform, PlatformLimiter::new(platform, config));
    }

    /// Consume one slot for a platform.
    pub fn check(&self, platform: CrmPlatform) -> std::result::Result<(), RateLimitExceeded> {
        match self.limiters.get(&platform) {
            Some(limiter) => limiter.check_limit(),
            // No configured limiter means unconstrained.
            None => Ok(()),
        }
    }
}

impl Default for RateLimiterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
