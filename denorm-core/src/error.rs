//! 统一错误定义
//!
//! 聚焦校验、时间戳解析、富化（外部查询）与存储等最小必要集合，
//! 便于在各组件间以 `DenormError` 统一传递与转换。
//!
use thiserror::Error;

/// 统一错误类型（事件核心最小必要集）
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DenormError {
    // --- 校验 ---
    #[error("malformed timestamp: {reason}")]
    MalformedTimestamp { reason: String },
    #[error("missing subject key fields: {missing:?}")]
    MissingKeyFields { missing: Vec<&'static str> },

    // --- 存储 ---
    #[error("store error: {reason}")]
    Store { reason: String },
    #[error("serialization error: {source}")]
    Serde {
        #[from]
        source: serde_json::Error,
    },

    // --- 配置 ---
    #[error("invalid skip pattern `{pattern}`: {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// 统一 Result 类型别名
pub type DenormResult<T> = Result<T, DenormError>;

impl From<chrono::ParseError> for DenormError {
    fn from(err: chrono::ParseError) -> Self {
        DenormError::MalformedTimestamp {
            reason: err.to_string(),
        }
    }
}
