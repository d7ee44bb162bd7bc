//! Failed-login throttling
//!
//! Keeps a sliding window of failure timestamps per normalized username.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;

#[derive(Clone)]
pub struct LoginThrottle {
    attempts: Arc<RwLock<HashMap<String, VecDeque<Instant>>>>,
    max_attempts: usize,
    window: Duration,
}

impl LoginThrottle {
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            attempts: Arc::new(RwLock::new(HashMap::new())),
            max_attempts,
            window,
        }
    }

    /// True when the username has used up its failures for the current window
    pub async fn is_locked(&self, username: &str) -> bool {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();

        match attempts.get_mut(username) {
            Some(history) => {
                drop_expired(history, now, self.window);
                let locked = history.len() >= self.max_attempts;
                if history.is_empty() {
                    attempts.remove(username);
                }
                locked
            }
            None => false,
        }
    }

    pub async fn record_failure(&self, username: &str) {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();

        let history = attempts.entry(username.to_string()).or_default();
        drop_expired(history, now, self.window);
        history.push_back(now);

        tracing::debug!(
            username = %username,
            failures = history.len(),
            "Recorded failed login"
        );
    }

    pub async fn clear(&self, username: &str) {
        self.attempts.write().await.remove(username);
    }

    /// Forget usernames with no failures inside the window
    pub async fn prune(&self) -> usize {
        let mut attempts = self.attempts.write().await;
        let now = Instant::now();
        let before = attempts.len();

        attempts.retain(|_, history| {
            drop_expired(history, now, self.window);
            !history.is_empty()
        });

        before - attempts.len()
    }
}

fn drop_expired(history: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = history.front() {
        if now.duration_since(*oldest) >= window {
            history.pop_front();
        } else {
            break;
        }
    }
}
