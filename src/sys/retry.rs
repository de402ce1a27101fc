// Copyright 2026 Hybrid Mount Developers
// SPDX-License-Identifier: GPL-3.0-or-later

use std::{thread, time::Duration};

/// Sleep-and-retry policy for reaching a system service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn new(interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    pub fn unbounded(interval: Duration) -> Self {
        Self::new(interval, None)
    }

    /// Calls `attempt` until it yields a value or the attempts run out.
    pub fn run<T>(&self, mut attempt: impl FnMut(u32) -> Option<T>) -> Option<T> {
        let mut tries = 0;
        loop {
            tries += 1;
            if let Some(value) = attempt(tries) {
                return Some(value);
            }
            if self.max_attempts.is_some_and(|max| tries >= max) {
                return None;
            }
            if !self.interval.is_zero() {
                thread::sleep(self.interval);
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::unbounded(Duration::from_secs(2))
    }
}
