//! 键值存储协议（KeyValueStore）
//!
//! 缓存主体实体与重试账本共用同一个注入的存储能力，以两个逻辑
//! 命名空间区分归属。实现方的约束：
//! - `put`/`compare_and_put` 返回即视为已落盘（事件确认前必须可恢复）；
//! - `compare_and_put` 提供按键的原子读改写，供账本在并发投递下使用。
//!
use crate::error::DenormResult;
use async_trait::async_trait;
use serde_json::Value;

/// 逻辑命名空间：同一存储下的两类键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// 缓存主体实体
    Subject,
    /// 重试账本条目
    Retry,
}

/// 键值存储能力：事件核心唯一的持久化入口
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 读取某命名空间下的值
    async fn get(&self, ns: Namespace, key: &str) -> DenormResult<Option<Value>>;

    /// 覆盖写入，返回前必须完成落盘
    async fn put(&self, ns: Namespace, key: &str, value: Value) -> DenormResult<()>;

    /// 原子比较写入：当前值等于 `expected` 时写入并返回 true；
    /// `expected = None` 表示仅当键不存在时写入
    async fn compare_and_put(
        &self,
        ns: Namespace,
        key: &str,
        expected: Option<&Value>,
        value: Value,
    ) -> DenormResult<bool>;
}
