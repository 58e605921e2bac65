//! Bounded polling shared by page-settle and download-completion waits.

use std::time::{Duration, Instant};

use tokio::time::sleep;

/// A wait that polls at a fixed interval and gives up at a deadline.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: Instant,
    timeout: Duration,
    interval: Duration,
}

impl Deadline {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self {
            start: Instant::now(),
            timeout,
            interval,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.timeout
    }

    /// Sleep until the next poll. Returns `false` once the deadline has passed;
    /// never sleeps past it.
    pub async fn tick(&self) -> bool {
        let elapsed = self.start.elapsed();
        if elapsed >= self.timeout {
            return false;
        }
        sleep(self.interval.min(self.timeout - elapsed)).await;
        true
    }
}

/// Counts consecutive identical observations.
#[derive(Debug)]
pub struct Stability<T> {
    last: Option<T>,
    repeats: u32,
    required: u32,
}

impl<T: PartialEq> Stability<T> {
    /// `required` consecutive equal observations (at least 1) make a value stable.
    pub fn new(required: u32) -> Self {
        Self {
            last: None,
            repeats: 0,
            required: required.max(1),
        }
    }

    /// Record an observation; returns true when it has been seen `required` times in a row.
    pub fn observe(&mut self, value: T) -> bool {
        if self.last.as_ref() == Some(&value) {
            self.repeats += 1;
        } else {
            self.last = Some(value);
            self.repeats = 1;
        }
        self.repeats >= self.required
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.repeats = 0;
    }

    pub fn last(&self) -> Option<&T> {
        self.last.as_ref()
    }
}

/// Poll `probe` until it yields a value or the deadline passes.
pub async fn poll_until<T, F>(timeout: Duration, interval: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Option<T>,
{
    let deadline = Deadline::new(timeout, interval);
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if !deadline.tick().await {
            return None;
        }
    }
}
