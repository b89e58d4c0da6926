//! 外部主体查询服务（SubjectLookup）
//!
//! 缓存未命中或过期时的回源协议。实现方对接真实的外部服务，
//! 错误在边界处保持不透明（`anyhow`），由富化引擎统一归类。
//!
use crate::subject::SubjectKey;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// 一次解析的结果
#[derive(Debug, Clone)]
pub enum Resolution {
    /// 解析到主体属性（由引擎盖上解析时间后落库）
    Found(Map<String, Value>),
    /// 服务侧明确不存在该主体
    NotFound,
}

/// 外部查询服务：按主体键解析属性
#[async_trait]
pub trait SubjectLookup: Send + Sync {
    /// 同步语义的有界调用；调用方负责超时控制
    async fn resolve(&self, key: &SubjectKey) -> anyhow::Result<Resolution>;
}
