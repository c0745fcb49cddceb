//! Dynamic field values and rows.
//!
//! `Value` is the single currency passed between raw input, entity fields,
//! the transform pipeline and the persistence collaborator. Storage-side
//! values are the scalar variants plus `Document`, `Raw` and `Express`;
//! domain-side values may additionally carry rich types and embedded entities.

use std::fmt;

use indexmap::IndexMap;

use crate::entity::Entity;
use crate::types::{RichValue, RichValueExt, TimeFormats, TransformContext};

/// Ordered field → value mapping. Insertion order is preserved end to end.
pub type Row = IndexMap<String, Value>;

/// A single field value.
#[derive(Debug, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Structured payload for `array` / `object` columns.
    Document(serde_json::Value),
    /// Rich domain value (dates, JSON wrapper, enumerations, value objects).
    Rich(Box<dyn RichValue>),
    /// Embedded one-to-one relation.
    Entity(Box<Entity>),
    /// Embedded one-to-many relation.
    Collection(Vec<Entity>),
    /// Unescaped literal; handed to persistence verbatim.
    Raw(Raw),
    /// Column arithmetic; handed to persistence verbatim.
    Express(Express),
}

impl Value {
    /// Wrap a rich domain value.
    #[must_use]
    pub fn rich(value: impl RichValue) -> Self {
        Self::Rich(Box::new(value))
    }

    /// Convert a JSON value into a raw field value. Arrays and objects become
    /// `Document`s; scalars map onto the matching scalar variant.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => n.as_i64().map_or_else(
                || {
                    n.as_u64().map_or_else(
                        || Self::Float(n.as_f64().unwrap_or_default()),
                        |u| Self::Int(i64::try_from(u).unwrap_or(i64::MAX)),
                    )
                },
                Self::Int,
            ),
            serde_json::Value::String(s) => Self::Text(s),
            doc @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Document(doc)
            }
        }
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_document(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Document(doc) => Some(doc),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity.as_ref()),
            _ => None,
        }
    }

    pub fn as_entity_mut(&mut self) -> Option<&mut Entity> {
        match self {
            Self::Entity(entity) => Some(entity.as_mut()),
            _ => None,
        }
    }

    /// Downcast a rich value to its concrete type.
    #[must_use]
    pub fn as_rich<T: RichValue>(&self) -> Option<&T> {
        match self {
            Self::Rich(rich) => rich.as_any().downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Whether this value is an embedded entity or a collection of them.
    #[must_use]
    pub const fn is_relation(&self) -> bool {
        matches!(self, Self::Entity(_) | Self::Collection(_))
    }

    /// Numeric step used by `inc`/`dec`. Null counts as zero; values that are
    /// not numeric are returned unchanged.
    #[must_use]
    pub fn add_step(&self, step: f64) -> Self {
        #[allow(clippy::float_cmp, clippy::cast_possible_truncation)]
        let integral = step.fract() == 0.0;
        match self {
            Self::Null if integral => Self::Int(step as i64),
            Self::Null => Self::Float(step),
            #[allow(clippy::cast_possible_truncation)]
            Self::Int(i) if integral => Self::Int(i.saturating_add(step as i64)),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(i) => Self::Float(*i as f64 + step),
            Self::Float(f) => Self::Float(f + step),
            Self::Text(s) => s.trim().parse::<i64>().map_or_else(
                |_| {
                    s.trim()
                        .parse::<f64>()
                        .map_or_else(|_| self.clone(), |f| Self::Float(f + step))
                },
                |i| Self::Int(i).add_step(step),
            ),
            other => other.clone(),
        }
    }

    /// Reduce to a plain JSON value for output documents and validation.
    #[must_use]
    pub fn to_plain(&self, ctx: &TransformContext<'_>) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Document(doc) => doc.clone(),
            Self::Rich(rich) => rich
                .to_plain(ctx)
                .or_else(|| rich.to_display().map(serde_json::Value::String))
                .unwrap_or(serde_json::Value::Null),
            Self::Entity(entity) => row_to_json(&entity.data(), ctx),
            Self::Collection(items) => serde_json::Value::Array(
                items.iter().map(|e| row_to_json(&e.data(), ctx)).collect(),
            ),
            Self::Raw(raw) => serde_json::Value::String(raw.expression.clone()),
            Self::Express(express) => serde_json::Value::String(express.sql()),
        }
    }

    /// [`Self::to_plain`] with default time formats and no owner context.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let formats = TimeFormats::default();
        self.to_plain(&TransformContext::new("", "", &formats))
    }
}

/// Reduce a whole row to a JSON object.
#[must_use]
pub fn row_to_json(row: &Row, ctx: &TransformContext<'_>) -> serde_json::Value {
    serde_json::Value::Object(
        row.iter()
            .map(|(name, value)| (name.clone(), value.to_plain(&ctx.for_field(name))))
            .collect(),
    )
}

impl Clone for Value {
    fn clone(&self) -> Self {
        match self {
            Self::Null => Self::Null,
            Self::Bool(b) => Self::Bool(*b),
            Self::Int(i) => Self::Int(*i),
            Self::Float(f) => Self::Float(*f),
            Self::Text(s) => Self::Text(s.clone()),
            Self::Document(doc) => Self::Document(doc.clone()),
            Self::Rich(rich) => Self::Rich(rich.clone_rich()),
            Self::Entity(entity) => Self::Entity(entity.clone()),
            Self::Collection(items) => Self::Collection(items.clone()),
            Self::Raw(raw) => Self::Raw(raw.clone()),
            Self::Express(express) => Self::Express(*express),
        }
    }
}

/// Strict equality: variants never compare equal across types, so `Int(1)`
/// differs from `Text("1")`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            #[allow(clippy::float_cmp)]
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Document(a), Self::Document(b)) => a == b,
            (Self::Rich(a), Self::Rich(b)) => a.eq_rich(&**b),
            (Self::Entity(a), Self::Entity(b)) => a == b,
            (Self::Collection(a), Self::Collection(b)) => a == b,
            (Self::Raw(a), Self::Raw(b)) => a == b,
            (Self::Express(a), Self::Express(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::from_json(value)
    }
}

impl From<Entity> for Value {
    fn from(value: Entity) -> Self {
        Self::Entity(Box::new(value))
    }
}

impl From<Vec<Entity>> for Value {
    fn from(value: Vec<Entity>) -> Self {
        Self::Collection(value)
    }
}

impl From<Raw> for Value {
    fn from(value: Raw) -> Self {
        Self::Raw(value)
    }
}

impl From<Express> for Value {
    fn from(value: Express) -> Self {
        Self::Express(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Anything an entity can be populated from.
pub trait IntoRow {
    fn into_row(self) -> Row;
}

impl IntoRow for Row {
    fn into_row(self) -> Row {
        self
    }
}

/// Objects map field by field; any other JSON shape yields an empty row.
impl IntoRow for serde_json::Value {
    fn into_row(self) -> Row {
        match self {
            Self::Object(map) => map.into_row(),
            _ => Row::new(),
        }
    }
}

impl IntoRow for serde_json::Map<String, serde_json::Value> {
    fn into_row(self) -> Row {
        self.into_iter()
            .map(|(name, value)| (name, Value::from_json(value)))
            .collect()
    }
}

impl IntoRow for &Entity {
    fn into_row(self) -> Row {
        self.data()
    }
}

impl<K: Into<String>, V: Into<Value>> IntoRow for Vec<(K, V)> {
    fn into_row(self) -> Row {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

impl<K: Into<String>, V: Into<Value>, const N: usize> IntoRow for [(K, V); N] {
    fn into_row(self) -> Row {
        self.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
    }
}

/// Unescaped SQL fragment with optional bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Raw {
    pub expression: String,
    pub bindings: Vec<Value>,
}

impl Raw {
    #[must_use]
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
            bindings: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_bindings(mut self, bindings: Vec<Value>) -> Self {
        self.bindings = bindings;
        self
    }
}

/// Arithmetic operator of an [`Express`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpressOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ExpressOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Column arithmetic applied by the persistence layer, e.g. `hits = hits + 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Express {
    pub op: ExpressOp,
    pub step: f64,
}

impl Express {
    #[must_use]
    pub const fn new(op: ExpressOp, step: f64) -> Self {
        Self { op, step }
    }

    /// Right-hand side fragment, e.g. `" + 1"`.
    #[must_use]
    pub fn sql(&self) -> String {
        format!(" {} {}", self.op.as_str(), self.step)
    }

    /// Apply the expression to a current column value.
    #[must_use]
    pub fn apply(&self, current: &Value) -> Value {
        match self.op {
            ExpressOp::Add => current.add_step(self.step),
            ExpressOp::Sub => current.add_step(-self.step),
            ExpressOp::Mul | ExpressOp::Div => {
                let base = current.as_f64().unwrap_or_default();
                let out = if self.op == ExpressOp::Mul {
                    base * self.step
                } else {
                    base / self.step
                };
                Value::Float(out)
            }
        }
    }
}

impl fmt::Display for Express {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql())
    }
}

/// Build an unescaped write passthrough.
#[must_use]
pub fn raw(expression: impl Into<String>) -> Value {
    Value::Raw(Raw::new(expression))
}

/// Build an increment expression.
#[must_use]
pub const fn inc(step: f64) -> Value {
    Value::Express(Express::new(ExpressOp::Add, step))
}

/// Build a decrement expression.
#[must_use]
pub const fn dec(step: f64) -> Value {
    Value::Express(Express::new(ExpressOp::Sub, step))
}
