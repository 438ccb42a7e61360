use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

#[derive(Default)]
struct Attempts {
    failures: Vec<Instant>,
    locked_until: Option<Instant>,
}

/// Failed administrator logins per account.
///
/// `max_failures` failures inside `window` lock the account for another `window`.
pub struct LoginGuard {
    max_failures: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, Attempts>>,
}

impl LoginGuard {
    pub fn new(max_failures: usize, window: Duration) -> Self {
        Self {
            max_failures: max_failures.max(1),
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    pub fn is_locked(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();

        match attempts.get(key).and_then(|entry| entry.locked_until) {
            Some(until) if now < until => true,
            Some(_) => {
                attempts.remove(key);
                false
            }
            None => false,
        }
    }

    /// Returns true when this failure locks the account.
    pub fn record_failure(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut attempts = self.attempts.lock();
        let entry = attempts.entry(key.to_string()).or_default();

        entry
            .failures
            .retain(|at| now.duration_since(*at) < self.window);
        entry.failures.push(now);

        if entry.failures.len() >= self.max_failures {
            entry.failures.clear();
            entry.locked_until = Some(now + self.window);
            return true;
        }
        false
    }

    pub fn clear(&self, key: &str) {
        self.attempts.lock().remove(key);
    }
}
