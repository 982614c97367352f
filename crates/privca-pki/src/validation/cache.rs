//! 验证结果缓存

use std::collections::HashMap;

use parking_lot::Mutex;
use time::{Duration, OffsetDateTime};

use super::{ValidationOptions, ValidationReport};

/// 缓存键：证书内容摘要与验证选项
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// SHA-256 of the certificate DER, hex
    pub digest: String,
    pub options: ValidationOptions,
}

#[derive(Debug, Clone)]
struct CacheItem {
    report: ValidationReport,
    cached_at: OffsetDateTime,
}

/// Bounded map with a fixed TTL
///
/// When full, expired items go first, then the oldest one.
#[derive(Debug)]
pub struct ValidationCache {
    items: Mutex<HashMap<CacheKey, CacheItem>>,
    ttl: Duration,
    capacity: usize,
}

impl ValidationCache {
    pub fn new(ttl_seconds: u64, capacity: usize) -> Self {
        Self {
            items: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(i64::try_from(ttl_seconds).unwrap_or(i64::MAX)),
            capacity,
        }
    }

    fn is_fresh(&self, item: &CacheItem, now: OffsetDateTime) -> bool {
        now - item.cached_at < self.ttl
    }

    /// 获取未过期的缓存项
    pub fn get(&self, key: &CacheKey) -> Option<ValidationReport> {
        let now = OffsetDateTime::now_utc();
        let mut items = self.items.lock();
        match items.get(key) {
            Some(item) if self.is_fresh(item, now) => Some(item.report.clone()),
            Some(_) => {
                items.remove(key);
                None
            }
            None => None,
        }
    }

    /// 写入缓存
    pub fn insert(&self, key: CacheKey, report: ValidationReport) {
        if self.capacity == 0 {
            return;
        }
        let now = OffsetDateTime::now_utc();
        let mut items = self.items.lock();
        if items.len() >= self.capacity && !items.contains_key(&key) {
            items.retain(|_, item| now - item.cached_at < self.ttl);
            if items.len() >= self.capacity {
                let oldest = items
                    .iter()
                    .min_by_key(|(_, item)| item.cached_at)
                    .map(|(key, _)| key.clone());
                if let Some(oldest) = oldest {
                    items.remove(&oldest);
                }
            }
        }
        items.insert(
            key,
            CacheItem {
                report,
                cached_at: now,
            },
        );
    }

    /// 清理过期缓存，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = OffsetDateTime::now_utc();
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|_, item| now - item.cached_at < self.ttl);
        before - items.len()
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}
