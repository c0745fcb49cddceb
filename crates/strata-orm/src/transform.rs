//! Storage ↔ domain value conversion.
//!
//! `read` runs on load, `write` on save. Both are total: a value that does
//! not fit its tag is handed on unchanged and left to validation.

use tracing::trace;

use crate::entity::Entity;
use crate::types::{Date, DateTime, Json, RichTypeRef, Timestamp, TransformContext, TypeTag};
use crate::value::{IntoRow, Value};

/// Convert a raw storage value into its domain form.
#[must_use]
pub fn read(raw: Value, tag: &TypeTag, ctx: &TransformContext<'_>) -> Value {
    if raw.is_null() {
        return Value::Null;
    }
    match tag {
        TypeTag::String => to_text(raw),
        TypeTag::Int => to_int(raw),
        TypeTag::Float => to_float(raw),
        TypeTag::Bool => to_bool(raw),
        TypeTag::Array => read_document(raw, serde_json::Value::Array(Vec::new())),
        TypeTag::Object => read_document(raw, serde_json::Value::Object(serde_json::Map::new())),
        TypeTag::Json => read_rich(raw, &RichTypeRef::of::<Json>(), ctx),
        TypeTag::Date => read_rich(raw, &RichTypeRef::of::<Date>(), ctx),
        TypeTag::DateTime => read_rich(raw, &RichTypeRef::of::<DateTime>(), ctx),
        TypeTag::Timestamp => read_rich(raw, &RichTypeRef::of::<Timestamp>(), ctx),
        TypeTag::Rich(rich) => read_rich(raw, rich, ctx),
        TypeTag::Entity(model) => match (raw, ctx.database) {
            (Value::Document(serde_json::Value::Object(map)), Some(db)) => {
                Value::from(Entity::build(*model, db.clone(), map.into_row()))
            }
            (raw, _) => raw,
        },
        TypeTag::Other(name) => {
            trace!(owner = ctx.owner, field = ctx.field, tag = %name, "unrecognised type tag, passing value through");
            raw
        }
    }
}

/// Convert a domain value into its storage form.
#[must_use]
pub fn write(value: Value, tag: &TypeTag, ctx: &TransformContext<'_>) -> Value {
    match value {
        Value::Null => return Value::Null,
        raw @ (Value::Raw(_) | Value::Express(_)) => return raw,
        _ => {}
    }
    match tag {
        TypeTag::String => to_text(reduce_rich(value, ctx)),
        TypeTag::Int => to_int(reduce_rich(value, ctx)),
        TypeTag::Float => to_float(reduce_rich(value, ctx)),
        TypeTag::Bool => to_bool(reduce_rich(value, ctx)),
        TypeTag::Array => write_array(value, ctx),
        TypeTag::Object => write_object(value, ctx),
        TypeTag::Json
        | TypeTag::Date
        | TypeTag::DateTime
        | TypeTag::Timestamp
        | TypeTag::Rich(_)
        | TypeTag::Other(_) => reduce_rich(value, ctx),
        TypeTag::Entity(_) => value,
    }
}

fn read_rich(raw: Value, rich: &RichTypeRef, ctx: &TransformContext<'_>) -> Value {
    match rich.read(&raw, ctx) {
        Some(value) => Value::Rich(value),
        None => {
            trace!(owner = ctx.owner, field = ctx.field, ty = rich.name, "value does not fit rich type, passing through");
            raw
        }
    }
}

/// Rich values reduce to storage form, then to their display string.
fn reduce_rich(value: Value, ctx: &TransformContext<'_>) -> Value {
    match value {
        Value::Rich(rich) => rich
            .to_storage(ctx)
            .or_else(|| rich.to_display().map(Value::Text))
            .unwrap_or(Value::Rich(rich)),
        other => other,
    }
}

fn read_document(raw: Value, empty: serde_json::Value) -> Value {
    match raw {
        Value::Text(s) if s.is_empty() => Value::Document(empty),
        Value::Text(s) => serde_json::from_str(&s).map_or(Value::Text(s), Value::Document),
        Value::Document(doc) if is_empty_document(&doc) => Value::Document(empty),
        other => other,
    }
}

fn is_empty_document(doc: &serde_json::Value) -> bool {
    match doc {
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

fn document_of(value: Value, ctx: &TransformContext<'_>) -> serde_json::Value {
    match value {
        Value::Document(doc) => doc,
        other => other.to_plain(ctx),
    }
}

fn write_array(value: Value, ctx: &TransformContext<'_>) -> Value {
    let doc = match document_of(value, ctx) {
        doc @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => doc,
        scalar => serde_json::Value::Array(vec![scalar]),
    };
    Value::Text(doc.to_string())
}

/// Documents and rich values are encoded; stored scalars pass through.
fn write_object(value: Value, ctx: &TransformContext<'_>) -> Value {
    let value = match value {
        scalar @ (Value::Text(_) | Value::Int(_) | Value::Float(_) | Value::Bool(_)) => {
            return scalar;
        }
        other => other,
    };
    let doc = match document_of(value, ctx) {
        serde_json::Value::Array(items) => serde_json::Value::Object(
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| (i.to_string(), item))
                .collect(),
        ),
        other => other,
    };
    Value::Text(doc.to_string())
}

fn to_text(value: Value) -> Value {
    match value {
        Value::Text(s) => Value::Text(s),
        Value::Int(i) => Value::Text(i.to_string()),
        Value::Float(f) => Value::Text(f.to_string()),
        Value::Bool(b) => Value::Text(if b { "1" } else { "0" }.to_string()),
        other => other,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn to_int(value: Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(i),
        Value::Float(f) => Value::Int(f as i64),
        Value::Bool(b) => Value::Int(i64::from(b)),
        Value::Text(s) => {
            let trimmed = s.trim();
            let parsed = trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64));
            parsed.map_or(Value::Text(s), Value::Int)
        }
        other => other,
    }
}

fn to_float(value: Value) -> Value {
    match value {
        Value::Float(f) => Value::Float(f),
        #[allow(clippy::cast_precision_loss)]
        Value::Int(i) => Value::Float(i as f64),
        Value::Bool(b) => Value::Float(if b { 1.0 } else { 0.0 }),
        Value::Text(s) => {
            let parsed = s.trim().parse::<f64>().ok();
            parsed.map_or(Value::Text(s), Value::Float)
        }
        other => other,
    }
}

fn to_bool(value: Value) -> Value {
    match value {
        Value::Bool(b) => Value::Bool(b),
        Value::Int(i) => Value::Bool(i != 0),
        Value::Float(f) => Value::Bool(f != 0.0),
        Value::Text(s) => Value::Bool(!matches!(s.trim(), "" | "0" | "false")),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{BackedEnum, Enum, TimeFormats};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Status {
        Active,
        Banned,
    }

    impl BackedEnum for Status {
        fn from_backing(value: &Value) -> Option<Self> {
            match value.as_str()? {
                "active" => Some(Self::Active),
                "banned" => Some(Self::Banned),
                _ => None,
            }
        }

        fn backing(&self) -> Value {
            match self {
                Self::Active => Value::from("active"),
                Self::Banned => Value::from("banned"),
            }
        }
    }

    fn with_ctx<R>(f: impl FnOnce(&TransformContext<'_>) -> R) -> R {
        let formats = TimeFormats::default();
        f(&TransformContext::new("test", "field", &formats))
    }

    #[rstest]
    #[case::text(TypeTag::String, Value::from("abc"))]
    #[case::int_as_text(TypeTag::String, Value::Int(12))]
    #[case::int(TypeTag::Int, Value::Int(42))]
    #[case::numeric_text(TypeTag::Int, Value::from("42"))]
    #[case::float(TypeTag::Float, Value::Float(1.5))]
    #[case::bool(TypeTag::Bool, Value::Bool(true))]
    #[case::bool_text(TypeTag::Bool, Value::from("0"))]
    fn primitive_write_after_read_matches_write(#[case] tag: TypeTag, #[case] raw: Value) {
        with_ctx(|ctx| {
            let direct = write(raw.clone(), &tag, ctx);
            let via_read = write(read(raw, &tag, ctx), &tag, ctx);
            assert_eq!(via_read, direct);
        });
    }

    #[rstest]
    #[case::json(TypeTag::Json, Value::rich(Json(json!({"a": 1}))))]
    #[case::enumeration(TypeTag::enumeration::<Status>(), Value::rich(Enum(Status::Banned)))]
    #[case::timestamp(TypeTag::Timestamp, Value::rich(Timestamp::from_unix(1_770_000_000).unwrap()))]
    fn rich_read_after_write_reconstructs(#[case] tag: TypeTag, #[case] value: Value) {
        with_ctx(|ctx| {
            let stored = write(value.clone(), &tag, ctx);
            assert!(!matches!(stored, Value::Rich(_)));
            assert_eq!(read(stored, &tag, ctx), value);
        });
    }

    #[test]
    fn null_short_circuits_both_directions() {
        with_ctx(|ctx| {
            assert_eq!(read(Value::Null, &TypeTag::Json, ctx), Value::Null);
            assert_eq!(write(Value::Null, &TypeTag::Array, ctx), Value::Null);
        });
    }

    #[test]
    fn raw_and_express_bypass_write() {
        with_ctx(|ctx| {
            let raw = crate::value::raw("NOW()");
            assert_eq!(write(raw.clone(), &TypeTag::Int, ctx), raw);
            let inc = crate::value::inc(1.0);
            assert_eq!(write(inc.clone(), &TypeTag::Int, ctx), inc);
        });
    }

    #[test]
    fn array_and_object_documents() {
        with_ctx(|ctx| {
            assert_eq!(
                read(Value::from(""), &TypeTag::Array, ctx),
                Value::Document(json!([]))
            );
            assert_eq!(
                read(Value::from("[1,2]"), &TypeTag::Array, ctx),
                Value::Document(json!([1, 2]))
            );
            assert_eq!(
                write(Value::Document(json!(["a"])), &TypeTag::Array, ctx),
                Value::from(r#"["a"]"#)
            );
            assert_eq!(
                write(Value::Document(json!([])), &TypeTag::Object, ctx),
                Value::from("{}")
            );
            assert_eq!(
                write(Value::Document(json!(["x"])), &TypeTag::Object, ctx),
                Value::from(r#"{"0":"x"}"#)
            );
        });
    }

    #[rstest]
    #[case::encoded_text(Value::from(r#"{"a":1}"#))]
    #[case::plain_text(Value::from("abc"))]
    #[case::int(Value::Int(5))]
    fn scalar_object_values_are_stored_unchanged(#[case] value: Value) {
        with_ctx(|ctx| {
            assert_eq!(write(value.clone(), &TypeTag::Object, ctx), value);
        });
    }

    #[test]
    fn encoded_object_text_reads_back_as_document() {
        with_ctx(|ctx| {
            let stored = write(Value::from(r#"{"a":1}"#), &TypeTag::Object, ctx);
            assert_eq!(
                read(stored, &TypeTag::Object, ctx),
                Value::Document(json!({"a": 1}))
            );
        });
    }

    #[test]
    fn uncoercible_values_pass_through() {
        with_ctx(|ctx| {
            assert_eq!(
                read(Value::from("abc"), &TypeTag::Int, ctx),
                Value::from("abc")
            );
            assert_eq!(
                read(Value::from("nope"), &TypeTag::DateTime, ctx),
                Value::from("nope")
            );
            let other = TypeTag::Other("geometry".into());
            assert_eq!(read(Value::Int(3), &other, ctx), Value::Int(3));
        });
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Money(i64);

    impl crate::types::RichValue for Money {
        fn to_display(&self) -> Option<String> {
            Some(format!("{}.{:02}", self.0 / 100, self.0 % 100))
        }
    }

    #[test]
    fn display_only_value_objects_write_their_string_form() {
        with_ctx(|ctx| {
            let tag = TypeTag::Other("money".into());
            assert_eq!(write(Value::rich(Money(1234)), &tag, ctx), Value::from("12.34"));
        });
    }
}
