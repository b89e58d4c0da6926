//! 字段存在性校验：要求字段存在且为非空字符串
//!
use super::{Validate, ValidationOutcome};
use crate::fields::RawEvent;
use serde_json::Value;

/// 要求某字段存在且为非空字符串的校验器
pub struct FieldPresence {
    field: &'static str,
    name: String,
}

impl FieldPresence {
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            name: format!("presence({field})"),
        }
    }
}

impl Validate for FieldPresence {
    fn name(&self) -> &str {
        &self.name
    }

    fn validate(&self, event: &RawEvent) -> ValidationOutcome {
        match event.read(self.field) {
            None | Some(Value::Null) => ValidationOutcome::Invalid {
                reason: format!("missing required field `{}`", self.field),
            },
            Some(Value::String(s)) if s.is_empty() => ValidationOutcome::Invalid {
                reason: format!("required field `{}` is empty", self.field),
            },
            Some(Value::String(_)) => ValidationOutcome::Valid,
            Some(_) => ValidationOutcome::Invalid {
                reason: format!("required field `{}` must be a string", self.field),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> RawEvent {
        RawEvent::new(value.as_object().cloned().expect("object"))
    }

    #[test]
    fn rejects_absent_null_empty_and_non_string() {
        let validator = FieldPresence::new("uid");

        for ev in [
            event(json!({})),
            event(json!({ "uid": null })),
            event(json!({ "uid": "" })),
            event(json!({ "uid": 42 })),
        ] {
            assert!(matches!(
                validator.validate(&ev),
                ValidationOutcome::Invalid { .. }
            ));
        }

        assert_eq!(
            validator.validate(&event(json!({ "uid": "u1" }))),
            ValidationOutcome::Valid
        );
    }
}
