//! 内存版键值存储（InMemoryStore）
//!
//! 基于互斥的 HashMap 实现 `KeyValueStore` 协议，锁内即为原子，
//! 天然满足 compare-and-put 语义。典型用途：测试环境与本地开发。
//!
use crate::error::DenormResult;
use crate::persist::{KeyValueStore, Namespace};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 简单的内存存储实现
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<HashMap<(Namespace, String), Value>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前键数量（测试断言用）
    pub fn len(&self) -> usize {
        self.inner.lock().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, ns: Namespace, key: &str) -> DenormResult<Option<Value>> {
        let guard = self.inner.lock().expect("store lock poisoned");
        Ok(guard.get(&(ns, key.to_string())).cloned())
    }

    async fn put(&self, ns: Namespace, key: &str, value: Value) -> DenormResult<()> {
        let mut guard = self.inner.lock().expect("store lock poisoned");
        guard.insert((ns, key.to_string()), value);
        Ok(())
    }

    async fn compare_and_put(
        &self,
        ns: Namespace,
        key: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> DenormResult<bool> {
        let mut guard = self.inner.lock().expect("store lock poisoned");
        let entry_key = (ns, key.to_string());
        if guard.get(&entry_key) == expected {
            guard.insert(entry_key, value);
            Ok(true)
        } else {
            Ok(false)
        }
    }
}
