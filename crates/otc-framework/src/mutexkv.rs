//! Keyed async mutexes.
//!
//! Serializes callbacks that touch the same server-side object through a non-idempotent API
//! (adding or removing routes on one router, for example). Locks are created on first use
//! and never removed, so the map is bounded by the number of distinct keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

#[derive(Debug, Default, Clone)]
pub struct MutexKv {
    locks: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

/// Held lock. Released on drop, on every exit path.
#[derive(Debug)]
pub struct KeyGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        debug!(key = %self.key, "Unlocked");
    }
}

impl MutexKv {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|p| p.into_inner());
        locks.entry(key.to_owned()).or_default().clone()
    }

    pub async fn lock(&self, key: &str) -> KeyGuard {
        debug!(key, "Locking");
        let guard = self.get(key).lock_owned().await;
        debug!(key, "Locked");
        KeyGuard {
            key: key.to_owned(),
            _guard: guard,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_serialized() {
        let kv = MutexKv::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let kv = kv.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            handles.push(tokio::spawn(async move {
                let _guard = kv.lock("router-1").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert_eq!(kv.len(), 1);
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_block() {
        let kv = MutexKv::new();
        let _a = kv.lock("a").await;
        let _b = kv.lock("b").await;
        assert_eq!(kv.len(), 2);
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        let kv = MutexKv::new();
        async fn failing(kv: &MutexKv) -> Result<(), String> {
            let _guard = kv.lock("k").await;
            Err("boom".into())
        }
        assert!(failing(&kv).await.is_err());
        let relock = tokio::time::timeout(Duration::from_secs(1), kv.lock("k")).await;
        assert!(relock.is_ok());
    }
}
