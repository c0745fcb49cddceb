//! JSON wrapper type.

use super::{RichValue, RichValueExt, TransformContext, Typeable};
use crate::value::Value;

/// Arbitrary JSON payload stored as JSON text.
///
/// Text that is not valid JSON is kept as a JSON string rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Json(pub serde_json::Value);

impl Json {
    #[must_use]
    pub const fn data(&self) -> &serde_json::Value {
        &self.0
    }
}

impl RichValue for Json {
    fn to_storage(&self, _ctx: &TransformContext<'_>) -> Option<Value> {
        Some(Value::Text(self.0.to_string()))
    }

    fn to_display(&self) -> Option<String> {
        Some(self.0.to_string())
    }

    fn to_plain(&self, _ctx: &TransformContext<'_>) -> Option<serde_json::Value> {
        Some(self.0.clone())
    }
}

impl Typeable for Json {
    fn from_storage(raw: &Value, _ctx: &TransformContext<'_>) -> Option<Self> {
        let data = match raw {
            Value::Text(s) => serde_json::from_str(s)
                .unwrap_or_else(|_| serde_json::Value::String(s.clone())),
            Value::Document(doc) => doc.clone(),
            Value::Rich(rich) => return rich.as_any().downcast_ref::<Self>().cloned(),
            other => other.to_json(),
        };
        Some(Self(data))
    }
}

impl From<Json> for Value {
    fn from(value: Json) -> Self {
        Self::rich(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TimeFormats;
    use serde_json::json;

    #[test]
    fn reads_json_text_and_keeps_invalid_text_as_string() {
        let formats = TimeFormats::default();
        let ctx = TransformContext::new("t", "meta", &formats);
        let parsed = Json::from_storage(&Value::Text(r#"{"a":[1,2]}"#.into()), &ctx).unwrap();
        assert_eq!(parsed.data(), &json!({"a": [1, 2]}));

        let kept = Json::from_storage(&Value::Text("plain".into()), &ctx).unwrap();
        assert_eq!(kept.data(), &json!("plain"));
    }

    #[test]
    fn writes_compact_json_text() {
        let formats = TimeFormats::default();
        let ctx = TransformContext::new("t", "meta", &formats);
        let value = Json(json!({"name": "日本"}));
        assert_eq!(
            value.to_storage(&ctx),
            Some(Value::Text(r#"{"name":"日本"}"#.into()))
        );
    }
}
