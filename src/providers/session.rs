use crate::types::ProviderId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// 会话令牌缓存
///
/// 每个基于会话的提供商最多保存一个令牌。没有过期计时器，
/// 只有上游拒绝时才会失效。并发写入采用后写者覆盖。
#[derive(Debug, Default)]
pub struct SessionCache {
    tokens: RwLock<HashMap<ProviderId, String>>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, provider: ProviderId) -> Option<String> {
        self.tokens.read().await.get(&provider).cloned()
    }

    pub async fn put(&self, provider: ProviderId, token: impl Into<String>) {
        self.tokens.write().await.insert(provider, token.into());
        debug!(%provider, "会话令牌已缓存");
    }

    /// 丢弃缓存的令牌，返回是否存在过
    pub async fn invalidate(&self, provider: ProviderId) -> bool {
        let removed = self.tokens.write().await.remove(&provider).is_some();
        if removed {
            debug!(%provider, "会话令牌已失效");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_put_invalidate() {
        let cache = SessionCache::new();
        assert_eq!(cache.get(ProviderId::Nova).await, None);

        cache.put(ProviderId::Nova, "token-1").await;
        assert_eq!(cache.get(ProviderId::Nova).await.as_deref(), Some("token-1"));

        cache.put(ProviderId::Nova, "token-2").await;
        assert_eq!(cache.get(ProviderId::Nova).await.as_deref(), Some("token-2"));

        assert!(cache.invalidate(ProviderId::Nova).await);
        assert!(!cache.invalidate(ProviderId::Nova).await);
        assert_eq!(cache.get(ProviderId::Nova).await, None);
    }

    #[tokio::test]
    async fn test_entries_are_per_provider() {
        let cache = SessionCache::new();
        cache.put(ProviderId::Nova, "nova-token").await;
        assert_eq!(cache.get(ProviderId::OpenAi).await, None);

        cache.invalidate(ProviderId::OpenAi).await;
        assert_eq!(cache.get(ProviderId::Nova).await.as_deref(), Some("nova-token"));
    }

    #[tokio::test]
    async fn test_concurrent_writers_last_one_wins() {
        let cache = Arc::new(SessionCache::new());
        let mut handles = Vec::new();
        for i in 0..16 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache.put(ProviderId::Nova, format!("token-{}", i)).await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let token = cache.get(ProviderId::Nova).await.unwrap();
        assert!(token.starts_with("token-"));
    }
}
