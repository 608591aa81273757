//! 缓存管理模块
//!
//! 进程内的通用缓存：按键存取、显式失效、按前缀失效，后台线程定期清理过期项

use metrics::{gauge, increment_counter};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::{Duration, Instant};

/// 课程目录缓存键前缀
pub const CATALOG_PREFIX: &str = "catalog:";
/// 排行榜缓存键前缀
pub const LEADERBOARD_PREFIX: &str = "leaderboard:";

/// 缓存项：类型擦除的数据和过期时间点
struct CacheEntry {
    data: Box<dyn Any + Send + Sync>,
    expiration: Instant,
}

struct CacheManager {
    entries: RwLock<HashMap<String, CacheEntry>>,
    default_duration: Duration,
}

impl CacheManager {
    fn new(default_duration: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_duration,
        }
    }

    /// 未过期且类型匹配时返回克隆
    fn get<T: Clone + 'static>(&self, key: &str) -> Option<T> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let Some(entry) = entries.get(key) else {
            increment_counter!("cache_misses_total", "reason" => "not_found");
            return None;
        };

        if Instant::now() >= entry.expiration {
            increment_counter!("cache_misses_total", "reason" => "expired");
            return None;
        }

        match entry.data.downcast_ref::<T>() {
            Some(data) => {
                increment_counter!("cache_hits_total");
                Some(data.clone())
            }
            None => {
                tracing::warn!("缓存键 {} 的类型与请求不一致", key);
                increment_counter!("cache_misses_total", "reason" => "type_mismatch");
                None
            }
        }
    }

    fn set<T: Send + Sync + 'static>(&self, key: &str, data: T, duration: Option<Duration>) {
        let entry = CacheEntry {
            data: Box::new(data),
            expiration: Instant::now() + duration.unwrap_or(self.default_duration),
        };

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), entry);

        increment_counter!("cache_sets_total");
        gauge!("cache_size_items", entries.len() as f64);
    }

    fn invalidate_where(&self, matches: impl Fn(&str) -> bool) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !matches(key));
        let removed = before - entries.len();

        if removed > 0 {
            increment_counter!("cache_invalidations_total");
            gauge!("cache_size_items", entries.len() as f64);
        }
        removed
    }

    /// 清理过期项，由后台线程定期调用
    fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.expiration > now);
        let removed = before - entries.len();

        if removed > 0 {
            gauge!("cache_size_items", entries.len() as f64);
            tracing::debug!("清理了 {} 个过期缓存项", removed);
        }
        removed
    }
}

// 全局缓存管理器实例
lazy_static::lazy_static! {
    static ref CACHE_MANAGER: Arc<CacheManager> = {
        let manager = Arc::new(CacheManager::new(Duration::from_secs(60)));

        let cleaner = Arc::clone(&manager);
        thread::spawn(move || loop {
            thread::sleep(Duration::from_secs(30));
            cleaner.cleanup_expired();
        });

        manager
    };
}

/// 从缓存获取数据
pub fn get_from_cache<T: Clone + 'static>(key: &str) -> Option<T> {
    CACHE_MANAGER.get(key)
}

/// 向缓存中设置数据，`duration` 为空时使用默认的 60 秒
pub fn set_to_cache<T: Send + Sync + 'static>(key: &str, data: T, duration: Option<Duration>) {
    CACHE_MANAGER.set(key, data, duration);
}

/// 使指定缓存键失效
pub fn invalidate_cache(key: &str) {
    CACHE_MANAGER.invalidate_where(|k| k == key);
}

/// 使某一前缀下的所有缓存键失效，返回删除的数量
pub fn invalidate_prefix(prefix: &str) -> usize {
    CACHE_MANAGER.invalidate_where(|k| k.starts_with(prefix))
}
