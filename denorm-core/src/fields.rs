//! 原始事件与字段读取（RawEvent）
//!
//! 事件以有序的字段映射形式从传输层进入本核心：
//! - `read`：空安全读取，区分“字段缺失”（`None`）与“显式 null”
//!   （`Some(Value::Null)`），支持 `a.b.c` 形式的嵌套路径；
//! - `occurred_at`：解析时间戳字段，缺失视为可选，存在但不可解析则报错；
//! - `subject_key`：由 `uid` 与 `channel` 推导主体键，二者缺一即失败；
//! - 富化阶段通过 `insert` 按属性覆盖写入，不重排、不裁剪已有字段。
//!
use crate::error::{DenormError, DenormResult};
use crate::subject::SubjectKey;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 唯一标识字段
pub const FIELD_UID: &str = "uid";
/// 渠道/租户字段
pub const FIELD_CHANNEL: &str = "channel";
/// 事件类型字段
pub const FIELD_EVENT_TYPE: &str = "eid";
/// 时间戳字段
pub const FIELD_TIMESTAMP: &str = "ts";
/// 消息标识字段（仅用于日志关联）
pub const FIELD_MESSAGE_ID: &str = "mid";

/// 原始事件：字段名到未定型值的有序映射
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent {
    map: Map<String, Value>,
}

impl RawEvent {
    pub fn new(map: Map<String, Value>) -> Self {
        Self { map }
    }

    /// 空安全读取；`None` 表示字段缺失，与显式 null 可区分
    pub fn read(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.map.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// 读取字符串字段；缺失、null 或非字符串均为 `None`
    pub fn read_str(&self, path: &str) -> Option<&str> {
        self.read(path).and_then(Value::as_str)
    }

    /// 顶层覆盖写入（last-write-wins），供富化合并使用
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.map.insert(name.into(), value);
    }

    /// 事件类型标识（跳过规则与后端判别的判别字段）
    pub fn event_type(&self) -> Option<&str> {
        self.read_str(FIELD_EVENT_TYPE)
    }

    /// 日志关联用标识：优先 `mid`，退化为 `eid`
    pub fn id(&self) -> &str {
        self.read_str(FIELD_MESSAGE_ID)
            .or_else(|| self.read_str(FIELD_EVENT_TYPE))
            .unwrap_or("unknown")
    }

    /// 解析时间戳字段：RFC 3339 字符串或整数毫秒时间戳；
    /// 缺失或显式 null 视为可选（`Ok(None)`），存在但不可解析则失败。
    pub fn occurred_at(&self) -> DenormResult<Option<DateTime<Utc>>> {
        let value = match self.read(FIELD_TIMESTAMP) {
            None | Some(Value::Null) => return Ok(None),
            Some(v) => v,
        };

        match value {
            Value::String(s) => {
                let parsed = DateTime::parse_from_rfc3339(s)?;
                Ok(Some(parsed.with_timezone(&Utc)))
            }
            Value::Number(n) => {
                let millis = n.as_i64().ok_or_else(|| DenormError::MalformedTimestamp {
                    reason: format!("not an integer millisecond timestamp: {n}"),
                })?;
                let parsed = DateTime::from_timestamp_millis(millis).ok_or_else(|| {
                    DenormError::MalformedTimestamp {
                        reason: format!("millisecond timestamp out of range: {millis}"),
                    }
                })?;
                Ok(Some(parsed))
            }
            other => Err(DenormError::MalformedTimestamp {
                reason: format!("unsupported timestamp shape: {other}"),
            }),
        }
    }

    /// 推导主体键；任一来源字段缺失或为空则失败
    pub fn subject_key(&self) -> DenormResult<SubjectKey> {
        let uid = self.read_str(FIELD_UID).filter(|s| !s.is_empty());
        let channel = self.read_str(FIELD_CHANNEL).filter(|s| !s.is_empty());

        match (uid, channel) {
            (Some(uid), Some(channel)) => Ok(SubjectKey::new(uid, channel)),
            (uid, channel) => {
                let mut missing = Vec::new();
                if uid.is_none() {
                    missing.push(FIELD_UID);
                }
                if channel.is_none() {
                    missing.push(FIELD_CHANNEL);
                }
                Err(DenormError::MissingKeyFields { missing })
            }
        }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.map
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.map
    }
}

impl From<Map<String, Value>> for RawEvent {
    fn from(map: Map<String, Value>) -> Self {
        Self::new(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: Value) -> RawEvent {
        match value {
            Value::Object(map) => RawEvent::new(map),
            _ => panic!("test event must be an object"),
        }
    }

    #[test]
    fn read_distinguishes_absent_from_null() {
        let ev = event(json!({ "a": null }));
        assert_eq!(ev.read("a"), Some(&Value::Null));
        assert_eq!(ev.read("b"), None);
    }

    #[test]
    fn read_follows_nested_paths() {
        let ev = event(json!({ "ctx": { "device": { "os": "android" } } }));
        assert_eq!(ev.read_str("ctx.device.os"), Some("android"));
        assert_eq!(ev.read("ctx.device.missing"), None);
        assert_eq!(ev.read("ctx.os"), None);
    }

    #[test]
    fn occurred_at_accepts_rfc3339_and_millis() {
        let ev = event(json!({ "ts": "2024-05-01T10:00:00+00:00" }));
        assert!(ev.occurred_at().unwrap().is_some());

        let ev = event(json!({ "ts": 1714557600000i64 }));
        assert!(ev.occurred_at().unwrap().is_some());
    }

    #[test]
    fn occurred_at_is_optional_when_absent() {
        let ev = event(json!({ "uid": "u1" }));
        assert_eq!(ev.occurred_at().unwrap(), None);
    }

    #[test]
    fn occurred_at_rejects_garbage() {
        let ev = event(json!({ "ts": "yesterday" }));
        assert!(matches!(
            ev.occurred_at(),
            Err(DenormError::MalformedTimestamp { .. })
        ));

        let ev = event(json!({ "ts": ["2024"] }));
        assert!(matches!(
            ev.occurred_at(),
            Err(DenormError::MalformedTimestamp { .. })
        ));
    }

    #[test]
    fn subject_key_requires_both_fields() {
        let ev = event(json!({ "uid": "u1", "channel": "c1" }));
        assert_eq!(ev.subject_key().unwrap().as_str(), "u1_c1");

        let ev = event(json!({ "uid": "u1" }));
        match ev.subject_key() {
            Err(DenormError::MissingKeyFields { missing }) => {
                assert_eq!(missing, vec![FIELD_CHANNEL]);
            }
            other => panic!("unexpected: {other:?}"),
        }

        let ev = event(json!({ "uid": "", "channel": "c1" }));
        assert!(ev.subject_key().is_err());
    }

    #[test]
    fn insert_overwrites_in_place() {
        let mut ev = event(json!({ "uid": "u1", "grade": "old" }));
        ev.insert("grade", json!("new"));
        ev.insert("age", json!(7));
        assert_eq!(ev.read_str("grade"), Some("new"));
        assert_eq!(ev.read("age"), Some(&json!(7)));
    }
}
