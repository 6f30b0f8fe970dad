//! 进程内退避存储
//!
//! 单实例部署使用；所有操作经由同一把 `tokio::sync::Mutex` 串行化。

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::BackoffStore;
use crate::error::AuthResult;

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: i64,
    expires_at: Instant,
}

/// 内存退避存储
#[derive(Debug, Default)]
pub struct MemoryBackoffStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryBackoffStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// 条目数超过此值时插入前先清理过期条目
const PRUNE_THRESHOLD: usize = 10_000;

fn prune(entries: &mut HashMap<String, Entry>, now: Instant) {
    if entries.len() >= PRUNE_THRESHOLD {
        entries.retain(|_, entry| entry.expires_at > now);
    }
}

fn live_value(entries: &HashMap<String, Entry>, key: &str, now: Instant) -> Option<i64> {
    entries
        .get(key)
        .filter(|entry| entry.expires_at > now)
        .map(|entry| entry.value)
}

#[async_trait]
impl BackoffStore for MemoryBackoffStore {
    async fn get(&self, key: &str) -> AuthResult<Option<i64>> {
        let entries = self.entries.lock().await;
        Ok(live_value(&entries, key, Instant::now()))
    }

    async fn incr_with_expiry(&self, key: &str, ttl_secs: u64) -> AuthResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        prune(&mut entries, now);
        let value = live_value(&entries, key, now).unwrap_or(0).saturating_add(1);
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now + Duration::from_secs(ttl_secs),
            },
        );
        Ok(value)
    }

    async fn set_max_with_expiry(&self, key: &str, value: i64, ttl_secs: u64) -> AuthResult<i64> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        prune(&mut entries, now);
        let ttl = Duration::from_secs(ttl_secs);
        let (value, expires_at) = match entries.get(key).filter(|e| e.expires_at > now) {
            Some(existing) if existing.value >= value => {
                (existing.value, existing.expires_at.max(now + ttl))
            }
            _ => (value, now + ttl),
        };

        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(value)
    }

    async fn delete(&self, keys: &[String]) -> AuthResult<()> {
        let mut entries = self.entries.lock().await;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_incr_and_get() {
        let store = MemoryBackoffStore::new();
        assert_eq!(store.get("k").await.unwrap(), None);
        assert_eq!(store.incr_with_expiry("k", 60).await.unwrap(), 1);
        assert_eq!(store.incr_with_expiry("k", 60).await.unwrap(), 2);
        assert_eq!(store.get("k").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_set_max() {
        let store = MemoryBackoffStore::new();
        assert_eq!(store.set_max_with_expiry("k", 100, 60).await.unwrap(), 100);
        assert_eq!(store.set_max_with_expiry("k", 50, 60).await.unwrap(), 100);
        assert_eq!(store.set_max_with_expiry("k", 150, 60).await.unwrap(), 150);
        assert_eq!(store.get("k").await.unwrap(), Some(150));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryBackoffStore::new();
        store.incr_with_expiry("a", 60).await.unwrap();
        store.incr_with_expiry("b", 60).await.unwrap();
        store
            .delete(&["a".to_string(), "missing".to_string()])
            .await
            .unwrap();
        assert_eq!(store.get("a").await.unwrap(), None);
        assert_eq!(store.get("b").await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_entries_expire() {
        let store = MemoryBackoffStore::new();
        store.incr_with_expiry("k", 0).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), None);
        // 过期后重新从 1 开始
        assert_eq!(store.incr_with_expiry("k", 60).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_prune_drops_expired_entries() {
        let store = MemoryBackoffStore::new();
        for i in 0..PRUNE_THRESHOLD {
            store.incr_with_expiry(&format!("k{i}"), 0).await.unwrap();
        }
        store.incr_with_expiry("live", 60).await.unwrap();
        assert_eq!(store.entries.lock().await.len(), 1);
    }
}
