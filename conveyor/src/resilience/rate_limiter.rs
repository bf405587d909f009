use std::time::Duration;

use conveyor_config::shared::RateLimitConfig;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const MINUTE: Duration = Duration::from_secs(60);
const DAY: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug)]
struct Windows {
    minute_start: Instant,
    minute_count: u32,
    day_start: Instant,
    day_count: u32,
}

/// Request throttle shared by the retry and pagination loop of one extractor.
///
/// Uses a fixed one-minute window with reset-on-rollover: counters reset when
/// a full window has elapsed since the window started, not on a sliding
/// per-request basis. Sub-second precision is deliberately out of scope. An
/// optional per-day budget is tracked the same way over 24 hours.
///
/// [`RateLimiter::acquire`] suspends only the calling task and never errors;
/// blocking latency is the only observable effect. Instances are owned per
/// extractor and must not be shared across extractors, so one slow API does
/// not throttle another.
#[derive(Debug)]
pub struct RateLimiter {
    requests_per_minute: u32,
    requests_per_day: Option<u32>,
    windows: Mutex<Windows>,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let now = Instant::now();

        Self {
            requests_per_minute: config.requests_per_minute.max(1),
            requests_per_day: config.requests_per_day,
            windows: Mutex::new(Windows {
                minute_start: now,
                minute_count: 0,
                day_start: now,
                day_count: 0,
            }),
        }
    }

    /// Suspends the calling task until a request slot is available, then
    /// claims it.
    ///
    /// Counters are updated under the internal mutex, so concurrent callers
    /// sharing one limiter never over-admit within a window.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut windows = self.windows.lock().await;
                let now = Instant::now();

                if now.duration_since(windows.minute_start) >= MINUTE {
                    windows.minute_start = now;
                    windows.minute_count = 0;
                }
                if now.duration_since(windows.day_start) >= DAY {
                    windows.day_start = now;
                    windows.day_count = 0;
                }

                let day_exhausted = self
                    .requests_per_day
                    .is_some_and(|budget| windows.day_count >= budget);

                if day_exhausted {
                    let wait = DAY - now.duration_since(windows.day_start);
                    warn!(
                        "daily request budget exhausted, waiting {}s for the window to roll over",
                        wait.as_secs()
                    );
                    wait
                } else if windows.minute_count >= self.requests_per_minute {
                    let wait = MINUTE - now.duration_since(windows.minute_start);
                    debug!(
                        "per-minute request budget exhausted, waiting {}ms",
                        wait.as_millis()
                    );
                    wait
                } else {
                    windows.minute_count += 1;
                    windows.day_count += 1;
                    return;
                }
            };

            tokio::time::sleep(wait).await;
        }
    }
}
