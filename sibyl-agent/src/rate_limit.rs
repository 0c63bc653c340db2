//! Fixed-window rate limiting on top-level query submission.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

use sibyl_core::RateLimitSettings;

struct Window {
    started_at: Instant,
    count: u32,
}

/// Per-client fixed-window counter. The window resets in full once it
/// elapses; there is no sliding behavior.
pub struct FixedWindowLimiter {
    windows: Mutex<HashMap<String, Window>>,
    window: Duration,
    max_requests: u32,
}

impl FixedWindowLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: Duration::from_secs(settings.window_seconds),
            max_requests: settings.max_requests,
        }
    }

    /// Record one request for `client_id`. Returns the remaining window
    /// duration when the client is over its budget.
    pub async fn check(&self, client_id: &str) -> Result<(), Duration> {
        let mut windows = self.windows.lock().await;
        let now = Instant::now();
        let window = windows.entry(client_id.to_string()).or_insert(Window {
            started_at: now,
            count: 0,
        });

        let elapsed = now.duration_since(window.started_at);
        if elapsed >= self.window {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_requests {
            return Err(self.window.saturating_sub(elapsed));
        }
        window.count += 1;
        Ok(())
    }

    pub async fn reset(&self) {
        self.windows.lock().await.clear();
    }
}
