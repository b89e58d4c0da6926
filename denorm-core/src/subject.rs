//! 主体键与缓存主体实体
//!
//! - `SubjectKey`：由事件的 `uid` 与 `channel` 推导的稳定字符串键，
//!   同时作为缓存实体与重试账本的存取键；
//! - `SubjectEntity`：某主体键下已解析的属性集合与解析时间，
//!   持久化于共享存储，供多次事件投递间复用。
//!
use bon::Builder;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// 主体键：`{uid}_{channel}`，对合法输入确定且无碰撞
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectKey(String);

impl SubjectKey {
    pub fn new(uid: &str, channel: &str) -> Self {
        Self(format!("{uid}_{channel}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 缓存主体实体
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
pub struct SubjectEntity {
    /// 解析得到的属性，富化时按键覆盖合并进事件
    attributes: Map<String, Value>,
    /// 本次解析的时间，用于新鲜度判断
    resolved_at: DateTime<Utc>,
}

impl SubjectEntity {
    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }

    /// 是否超过新鲜度窗口；解析时间晚于 `now`（时钟偏斜）按新鲜处理
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match (now - self.resolved_at).to_std() {
            Ok(elapsed) => elapsed >= window,
            Err(_) => false,
        }
    }
}
