use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use log::warn;
use tokio::sync::OnceCell;

/// 静态资源的进程级字节缓存：规范化路径 -> 文件内容。
///
/// 条目在首次读取时惰性填充，之后在整个生命周期内既不淘汰也不失效。
/// 每个键对应一个 `OnceCell`，并发的未命中只会触发一次后端读取；读取失败不会写入缓存。
#[derive(Default)]
pub struct AssetCache {
    entries: Mutex<HashMap<String, Arc<OnceCell<Bytes>>>>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 命中时直接返回缓存内容，未命中时调用 `load` 读取并记住结果。
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, load: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        let cell = {
            let mut entries = match self.entries.lock() {
                Ok(lock) => lock,
                Err(poisoned) => {
                    warn!("资源缓存锁被污染，恢复并继续");
                    poisoned.into_inner()
                }
            };
            Arc::clone(entries.entry(key.to_string()).or_default())
        };
        let result = cell.get_or_try_init(load).await.cloned();
        if result.is_err() {
            self.forget_empty(key, &cell);
        }
        result
    }

    /// 读取失败后移除仍未填充的条目，避免不存在的路径在表中无限累积。
    fn forget_empty(&self, key: &str, cell: &Arc<OnceCell<Bytes>>) {
        let mut entries = match self.entries.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        // 只移除本次使用的那个格子；期间若已有并发读取成功填充，则保留
        let stale = entries
            .get(key)
            .map_or(false, |current| Arc::ptr_eq(current, cell) && !current.initialized());
        if stale {
            entries.remove(key);
        }
    }

    /// 查询已填充的缓存内容，不触发读取。
    pub fn find(&self, key: &str) -> Option<Bytes> {
        let entries = match self.entries.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.get(key).and_then(|cell| cell.get().cloned())
    }

    /// 已填充的条目数量
    pub fn len(&self) -> usize {
        let entries = match self.entries.lock() {
            Ok(lock) => lock,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.values().filter(|cell| cell.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
