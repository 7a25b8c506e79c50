use std::time::Duration;

/// Timing knobs shared by both sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deadline for one request/response exchange.
    pub request_timeout: Duration,
    /// Read used to drop stale reports before the controller open sequence.
    pub flush_timeout: Duration,
    /// Longest single transport read in the controller worker and IMU reader.
    pub poll_interval: Duration,
    /// Capacity of the IMU sample channel; samples are dropped when full.
    pub sample_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(1000),
            flush_timeout: Duration::from_millis(10),
            poll_interval: Duration::from_millis(10),
            sample_capacity: 256,
        }
    }
}

impl SessionConfig {
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
