//! 事件准入判别：后端分类与跳过规则
//!
//! - `BackendClassifier`：按配置的后端事件类型集合判别，命中者不进入
//!   富化与下游输出，也不参与重试记账；
//! - `SkipFilter`：事件类型对配置正则的整串匹配（非子串），命中者跳过
//!   后续处理；判别字段缺失时不可判定，因此不跳过（宁可放行）。
//!   正则在配置装载时一次性编译。
//!
use crate::error::{DenormError, DenormResult};
use crate::fields::RawEvent;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;

/// 后端事件分类器
#[derive(Debug, Clone)]
pub struct BackendClassifier {
    backend_events: HashSet<String>,
}

impl BackendClassifier {
    pub fn new(backend_events: HashSet<String>) -> Self {
        Self { backend_events }
    }

    pub fn is_backend(&self, event: &RawEvent) -> bool {
        event
            .event_type()
            .is_some_and(|t| self.backend_events.contains(t))
    }
}

/// 跳过规则过滤器（预编译、整串匹配）
#[derive(Debug, Clone)]
pub struct SkipFilter {
    patterns: Vec<Regex>,
}

impl SkipFilter {
    /// 编译全部跳过规则；锚定为整串匹配，与子串匹配语义区分
    pub fn compile<'a>(patterns: impl IntoIterator<Item = &'a str>) -> DenormResult<Self> {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                Regex::new(&format!("^(?:{p})$")).map_err(|e| DenormError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<DenormResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// 判别字段缺失时不可判定，返回 false（不跳过）
    pub fn should_skip(&self, event: &RawEvent) -> bool {
        let Some(event_type) = event.event_type() else {
            return false;
        };
        for pattern in &self.patterns {
            if pattern.is_match(event_type) {
                debug!(event_type, pattern = pattern.as_str(), "event matches skip pattern");
                return true;
            }
        }
        false
    }
}
