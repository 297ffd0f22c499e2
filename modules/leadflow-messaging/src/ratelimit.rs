use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Sliding-window outbound rate limiter, per channel. Process-local.
pub struct RateLimiter {
    max_per_window: u32,
    window: Duration,
    timestamps: Mutex<Vec<Instant>>,
}

impl RateLimiter {
    pub fn new(max_per_minute: u32) -> Self {
        Self::with_window(max_per_minute, Duration::from_secs(60))
    }

    pub fn with_window(max_per_window: u32, window: Duration) -> Self {
        Self {
            max_per_window,
            window,
            timestamps: Mutex::new(Vec::new()),
        }
    }

    /// Consume one slot if the window has capacity.
    pub fn allow(&self) -> bool {
        let mut timestamps = self.timestamps.lock().unwrap();
        let now = Instant::now();
        timestamps.retain(|t| now.duration_since(*t) < self.window);
        if (timestamps.len() as u32) < self.max_per_window {
            timestamps.push(now);
            true
        } else {
            false
        }
    }
}
