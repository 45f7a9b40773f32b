//! Spam-score bookkeeping per IP and per captcha session (spec §4.8).

use crate::store::{Multi, Store};
use std::time::Duration;

/// Configured thresholds. Mirrors the donor's convention of a small plain
/// struct of tunables passed in from config rather than hardcoded constants.
#[derive(Debug, Clone, Copy)]
pub struct ThrottleConfig {
    /// TTL of the per-IP "recently posted a new thread" marker.
    pub thread_throttle: Duration,
    /// Spam score at which a session/IP must solve a new captcha.
    pub spam_score_threshold: i64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            thread_throttle: Duration::from_secs(30),
            spam_score_threshold: 3000,
        }
    }
}

pub struct Throttle {
    config: ThrottleConfig,
}

impl Throttle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { config }
    }

    /// Is `ip` currently barred from starting a new thread? (`ip:{addr}`
    /// TTL'd marker per spec §6.)
    pub async fn check_throttle(&self, store: &dyn Store, ip: &str) -> crate::store::StoreResult<bool> {
        Ok(store.str_get(&format!("ip:{ip}")).await?.is_some())
    }

    /// Mark `ip` as having just started a new thread.
    pub async fn mark_thread_started(&self, store: &dyn Store, ip: &str) -> crate::store::StoreResult<()> {
        store.str_set(&format!("ip:{ip}"), "1", Some(self.config.thread_throttle)).await
    }

    /// Atomically add `delta` to both the per-session and per-ip spam
    /// counters, returning whether either counter crossed the threshold as a
    /// result (the caller signals the owning Subscription to require a
    /// fresh captcha before its next write).
    pub async fn increment_spam_score(
        &self,
        store: &dyn Store,
        session: &str,
        ip: &str,
        delta: i64,
    ) -> crate::store::StoreResult<bool> {
        let session_key = format!("spam:session:{session}");
        let ip_key = format!("spam:ip:{ip}");
        store.commit(Multi::new().incr(&session_key, delta).incr(&ip_key, delta)).await?;
        let session_score = store.incr(&session_key, 0).await?;
        let ip_score = store.incr(&ip_key, 0).await?;
        Ok(session_score >= self.config.spam_score_threshold || ip_score >= self.config.spam_score_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn check_throttle_reflects_ttl_marker() {
        let store = MemoryStore::new();
        let throttle = Throttle::new(ThrottleConfig {
            thread_throttle: Duration::from_millis(20),
            ..Default::default()
        });
        assert!(!throttle.check_throttle(&store, "1.2.3.4").await.unwrap());
        throttle.mark_thread_started(&store, "1.2.3.4").await.unwrap();
        assert!(throttle.check_throttle(&store, "1.2.3.4").await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!throttle.check_throttle(&store, "1.2.3.4").await.unwrap());
    }

    #[tokio::test]
    async fn spam_score_crosses_threshold() {
        let store = MemoryStore::new();
        let throttle = Throttle::new(ThrottleConfig {
            spam_score_threshold: 10,
            ..Default::default()
        });
        assert!(!throttle.increment_spam_score(&store, "sess1", "1.2.3.4", 5).await.unwrap());
        assert!(throttle.increment_spam_score(&store, "sess1", "1.2.3.4", 6).await.unwrap());
    }
}
