//! 按模块名称加锁
//!
//! 同名模块的安装、启用/禁用、卸载、同步互斥执行；不同名称之间可以并发。

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 持有 `name` 对应的锁执行 `f`
    ///
    /// 名称按小写归一，与注册表大小写不敏感的唯一约束一致
    pub fn with_lock<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let key = name.trim().to_lowercase();
        // 先克隆出 Arc，释放分片锁后再阻塞等待
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let result = {
            let _guard = mutex.lock();
            f()
        };
        // 只剩表内与本地两份引用时没有其他等待者，移除空闲条目
        self.locks.remove_if(&key, |_, m| Arc::strong_count(m) == 2);
        result
    }

    /// 当前持有或等待中的名称数
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
