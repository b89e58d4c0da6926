//! 校验链（Validator Chain）
//!
//! 判定事件是否完整到可以进入后续处理：
//! - 每个校验器只读原始字段映射，报告 `Valid` 或 `Invalid(reason)`；
//! - 链按固定顺序执行并在首个失败处短路（第一个可操作的错误优先）；
//! - 由工厂函数静态装配，不做运行时发现。
//!
use crate::fields::RawEvent;

pub mod presence;

pub use presence::FieldPresence;

/// 单次校验的结论，仅在事件生命周期内存在，不持久化
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationOutcome {
    Valid,
    Invalid { reason: String },
}

/// 校验器：对原始字段映射的只读检查
pub trait Validate: Send + Sync {
    /// 校验器名称（用于失败日志）
    fn name(&self) -> &str;
    /// 检查事件，无副作用
    fn validate(&self, event: &RawEvent) -> ValidationOutcome;
}

/// 装配固定顺序的校验链：主体键来源字段必须存在且非空
pub fn validator_chain() -> Vec<Box<dyn Validate>> {
    vec![
        Box::new(FieldPresence::new(crate::fields::FIELD_UID)),
        Box::new(FieldPresence::new(crate::fields::FIELD_CHANNEL)),
    ]
}
