//! Semantic type tags and rich value types.
//!
//! A [`TypeTag`] is what the schema records per field. Primitive tags are
//! coerced directly; rich tags dispatch to a registered type's own
//! construct-from-storage / reduce-to-storage pair.

mod date;
mod enumeration;
mod json;

pub use date::{Date, DateTime, Timestamp};
pub use enumeration::{BackedEnum, Enum};
pub use json::Json;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use strata_config::EntityDefaults;

use crate::model::ModelRef;
use crate::persistence::Database;
use crate::value::Value;

/// Semantic type of a mapped field.
#[derive(Clone, PartialEq)]
pub enum TypeTag {
    String,
    Int,
    Float,
    Bool,
    /// JSON array/map stored as text.
    Array,
    /// Like `Array`, but always encoded as a JSON object.
    Object,
    Json,
    Date,
    DateTime,
    Timestamp,
    /// Registered rich type (enumeration, value object, ...).
    Rich(RichTypeRef),
    /// Embedded entity of another mapped type.
    Entity(ModelRef),
    /// Unrecognised tag; values pass through untouched.
    Other(String),
}

impl TypeTag {
    /// Map a column type name, as reported by schema introspection, to a tag.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "string" | "str" | "text" | "varchar" | "char" => Self::String,
            "int" | "integer" | "bigint" | "smallint" | "tinyint" => Self::Int,
            "float" | "double" | "real" | "decimal" => Self::Float,
            "bool" | "boolean" => Self::Bool,
            "array" => Self::Array,
            "object" => Self::Object,
            "json" => Self::Json,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "timestamp" => Self::Timestamp,
            _ => Self::Other(name.to_string()),
        }
    }

    /// Tag for a backed enumeration.
    #[must_use]
    pub fn enumeration<E: BackedEnum>() -> Self {
        Self::Rich(RichTypeRef::of::<Enum<E>>())
    }

    /// Tag for a custom rich type.
    #[must_use]
    pub fn rich<T: Typeable>() -> Self {
        Self::Rich(RichTypeRef::of::<T>())
    }

    /// Tag for an embedded entity type.
    #[must_use]
    pub fn entity<M: crate::model::Model>() -> Self {
        Self::Entity(ModelRef::of::<M>())
    }

    #[must_use]
    pub const fn is_entity(&self) -> bool {
        matches!(self, Self::Entity(_))
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::Int => f.write_str("int"),
            Self::Float => f.write_str("float"),
            Self::Bool => f.write_str("bool"),
            Self::Array => f.write_str("array"),
            Self::Object => f.write_str("object"),
            Self::Json => f.write_str("json"),
            Self::Date => f.write_str("date"),
            Self::DateTime => f.write_str("datetime"),
            Self::Timestamp => f.write_str("timestamp"),
            Self::Rich(rich) => write!(f, "rich({})", rich.name),
            Self::Entity(model) => write!(f, "entity({})", model.name()),
            Self::Other(name) => write!(f, "other({name})"),
        }
    }
}

/// Storage formats for the built-in temporal types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormats {
    pub date: String,
    pub datetime: String,
}

impl Default for TimeFormats {
    fn default() -> Self {
        Self::from(&EntityDefaults::default())
    }
}

impl From<&EntityDefaults> for TimeFormats {
    fn from(defaults: &EntityDefaults) -> Self {
        Self {
            date: defaults.date_format.clone(),
            datetime: defaults.datetime_format.clone(),
        }
    }
}

/// Context handed to every transform: which entity and field the value
/// belongs to, and how temporal values are formatted.
#[derive(Clone, Copy)]
pub struct TransformContext<'a> {
    pub owner: &'a str,
    pub field: &'a str,
    pub formats: &'a TimeFormats,
    pub(crate) database: Option<&'a Arc<dyn Database>>,
}

impl<'a> TransformContext<'a> {
    #[must_use]
    pub const fn new(owner: &'a str, field: &'a str, formats: &'a TimeFormats) -> Self {
        Self {
            owner,
            field,
            formats,
            database: None,
        }
    }

    #[must_use]
    pub(crate) const fn with_database(mut self, database: &'a Arc<dyn Database>) -> Self {
        self.database = Some(database);
        self
    }

    /// Same owner and formats, different field.
    #[must_use]
    pub const fn for_field<'b>(&'b self, field: &'b str) -> TransformContext<'b>
    where
        'a: 'b,
    {
        TransformContext {
            owner: self.owner,
            field,
            formats: self.formats,
            database: self.database,
        }
    }
}

/// A rich domain value held in a [`Value::Rich`].
///
/// Every capability is optional. Writes try `to_storage`, then
/// `to_display`, and otherwise hand the value on unchanged.
pub trait RichValue: RichValueExt + fmt::Debug + Send + Sync + 'static {
    /// Reduce to the storage representation.
    fn to_storage(&self, _ctx: &TransformContext<'_>) -> Option<Value> {
        None
    }

    /// String conversion capability for plain value objects.
    fn to_display(&self) -> Option<String> {
        None
    }

    /// Reduce to a plain value for output documents.
    fn to_plain(&self, _ctx: &TransformContext<'_>) -> Option<serde_json::Value> {
        None
    }
}

/// Object-safe clone/equality/downcast plumbing, implemented automatically
/// for every `Clone + PartialEq` rich value.
pub trait RichValueExt {
    fn clone_rich(&self) -> Box<dyn RichValue>;
    fn eq_rich(&self, other: &dyn RichValue) -> bool;
    fn as_any(&self) -> &dyn Any;
}

impl<T: RichValue + Clone + PartialEq> RichValueExt for T {
    fn clone_rich(&self) -> Box<dyn RichValue> {
        Box::new(self.clone())
    }

    fn eq_rich(&self, other: &dyn RichValue) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Rich value that can be constructed from its storage form.
pub trait Typeable: RichValue + Sized {
    /// Build from a raw storage value, or `None` if the value does not fit.
    fn from_storage(raw: &Value, ctx: &TransformContext<'_>) -> Option<Self>;
}

type ReadFn = fn(&Value, &TransformContext<'_>) -> Option<Box<dyn RichValue>>;

/// Registered descriptor of a rich type, stored in [`TypeTag::Rich`].
#[derive(Clone, Copy)]
pub struct RichTypeRef {
    pub name: &'static str,
    read: ReadFn,
}

fn read_as<T: Typeable>(raw: &Value, ctx: &TransformContext<'_>) -> Option<Box<dyn RichValue>> {
    T::from_storage(raw, ctx).map(|value| Box::new(value) as Box<dyn RichValue>)
}

impl RichTypeRef {
    #[must_use]
    pub fn of<T: Typeable>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            read: read_as::<T>,
        }
    }

    /// Construct the rich value from storage.
    #[must_use]
    pub fn read(&self, raw: &Value, ctx: &TransformContext<'_>) -> Option<Box<dyn RichValue>> {
        (self.read)(raw, ctx)
    }
}

impl PartialEq for RichTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl fmt::Debug for RichTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RichTypeRef").field(&self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_maps_known_and_unknown_names() {
        assert_eq!(TypeTag::parse("INT"), TypeTag::Int);
        assert_eq!(TypeTag::parse("varchar"), TypeTag::String);
        assert_eq!(TypeTag::parse("datetime"), TypeTag::DateTime);
        assert_eq!(
            TypeTag::parse("geometry"),
            TypeTag::Other("geometry".to_string())
        );
    }

    #[test]
    fn rich_refs_compare_by_type() {
        assert_eq!(RichTypeRef::of::<Json>(), RichTypeRef::of::<Json>());
        assert_ne!(RichTypeRef::of::<Json>(), RichTypeRef::of::<Date>());
    }
}
