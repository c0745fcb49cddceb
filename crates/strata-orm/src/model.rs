//! Entity type registration.
//!
//! A concrete entity type is a marker type implementing [`Model`]. Instead of
//! reflecting over struct fields, the type declares its fields, binding
//! options and accessor overrides once; the engine caches what it derives
//! from them per type.
//!
//! ```
//! use strata_orm::{EntityOptions, FieldDecl, Model, TypeTag};
//!
//! struct User;
//!
//! impl Model for User {
//!     fn name() -> &'static str {
//!         "user"
//!     }
//!
//!     fn fields() -> Vec<FieldDecl> {
//!         vec![
//!             FieldDecl::new("id", TypeTag::Int),
//!             FieldDecl::new("name", TypeTag::String),
//!         ]
//!     }
//!
//!     fn options() -> EntityOptions {
//!         EntityOptions::table("users").hidden(["password"])
//!     }
//! }
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::persistence::Validator;
use crate::types::TypeTag;
use crate::value::{Row, Value};

/// Declarative description of a concrete entity type.
pub trait Model: 'static {
    /// Name used for logging, default table binding and validator lookup.
    fn name() -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Declared fields in declaration order. An empty list marks a fully
    /// dynamic entity whose schema comes from options or introspection.
    fn fields() -> Vec<FieldDecl> {
        Vec::new()
    }

    fn options() -> EntityOptions {
        EntityOptions::default()
    }

    /// Register per-field getter/setter overrides.
    fn accessors(_registry: &mut Accessors) {}
}

/// Type-erased handle to a [`Model`] implementation.
#[derive(Clone, Copy)]
pub struct ModelRef {
    type_id: fn() -> TypeId,
    name: fn() -> &'static str,
    fields: fn() -> Vec<FieldDecl>,
    options: fn() -> EntityOptions,
    accessors: fn(&mut Accessors),
}

impl ModelRef {
    #[must_use]
    pub fn of<M: Model>() -> Self {
        Self {
            type_id: TypeId::of::<M>,
            name: M::name,
            fields: M::fields,
            options: M::options,
            accessors: M::accessors,
        }
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        (self.name)()
    }

    #[must_use]
    pub fn fields(&self) -> Vec<FieldDecl> {
        (self.fields)()
    }

    #[must_use]
    pub fn options(&self) -> EntityOptions {
        (self.options)()
    }

    pub(crate) fn register_accessors(&self, registry: &mut Accessors) {
        (self.accessors)(registry);
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id() == other.type_id()
    }
}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ModelRef").field(&self.name()).finish()
    }
}

/// A declared field and its semantic type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeTag,
}

impl FieldDecl {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: TypeTag) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Where an entity's rows live.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BackingSource {
    /// Bound to the model named after the entity type.
    #[default]
    Model,
    /// Bound to an explicitly named model.
    ModelClass(String),
    /// Bound directly to a table, single-table access only.
    Table(String),
    /// No backing table; every persistence call is a no-op.
    Virtual,
    /// Read-only view; persistence calls are no-ops and loads accept any field.
    View,
}

impl BackingSource {
    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        matches!(self, Self::Virtual)
    }

    #[must_use]
    pub const fn is_view(&self) -> bool {
        matches!(self, Self::View)
    }

    /// Virtual and view sources never reach the persistence collaborator.
    #[must_use]
    pub const fn is_detached(&self) -> bool {
        self.is_virtual() || self.is_view()
    }
}

/// Timestamp auto-fill setting for one of the creation/update fields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TimestampField {
    /// Use the configured default name.
    #[default]
    Default,
    Named(String),
    Disabled,
}

impl TimestampField {
    pub(crate) fn resolve(&self, default: Option<&str>) -> Option<String> {
        match self {
            Self::Default => default.map(str::to_string),
            Self::Named(name) => Some(name.clone()),
            Self::Disabled => None,
        }
    }
}

/// Which sub-attributes of a joined relation are copied onto the owner.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BindRule {
    /// Copy every attribute not already set on the owner.
    pub all: bool,
    /// Copy these attributes, keeping their names, unless already set.
    pub attrs: Vec<String>,
    /// Copy attribute → owner field, unconditionally.
    pub rename: IndexMap<String, String>,
}

impl BindRule {
    #[must_use]
    pub fn all() -> Self {
        Self {
            all: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn attrs<I, S>(attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            attrs: attrs.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn rename(mut self, attr: impl Into<String>, field: impl Into<String>) -> Self {
        self.rename.insert(attr.into(), field.into());
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.all && self.attrs.is_empty() && self.rename.is_empty()
    }
}

/// Relation attribute binding configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindAttr {
    #[default]
    None,
    /// Bind every attribute of every relation.
    All,
    /// Per-relation rules.
    Relations(IndexMap<String, BindRule>),
}

impl BindAttr {
    /// Rule for one relation, if any applies.
    #[must_use]
    pub fn rule_for(&self, relation: &str) -> Option<BindRule> {
        match self {
            Self::None => None,
            Self::All => Some(BindRule::all()),
            Self::Relations(rules) => rules.get(relation).filter(|r| !r.is_empty()).cloned(),
        }
    }
}

/// Per-type binding and exposure options.
///
/// Unset values fall back to the configured [`strata_config::EntityDefaults`].
#[derive(Clone, Default)]
pub struct EntityOptions {
    pub source: BackingSource,
    pub pk: Option<String>,
    pub create_time: TimestampField,
    pub update_time: TimestampField,
    /// Explicit field types, used for dynamic entities and as overrides of
    /// introspected column types.
    pub types: IndexMap<String, TypeTag>,
    pub readonly: Vec<String>,
    pub disuse: Vec<String>,
    pub hidden: Vec<String>,
    pub visible: Vec<String>,
    pub append: Vec<String>,
    /// Declared field name → external name.
    pub mapping: IndexMap<String, String>,
    pub strict: Option<bool>,
    pub bind_attr: BindAttr,
    pub auto_relation: Vec<String>,
    /// Relation name → foreign key field set on the relation when cascading.
    pub relation_keys: IndexMap<String, String>,
    pub validate: Option<Arc<dyn Validator>>,
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl EntityOptions {
    #[must_use]
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            source: BackingSource::Table(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn model_class(name: impl Into<String>) -> Self {
        Self {
            source: BackingSource::ModelClass(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn virtual_source() -> Self {
        Self {
            source: BackingSource::Virtual,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn view() -> Self {
        Self {
            source: BackingSource::View,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn pk(mut self, pk: impl Into<String>) -> Self {
        self.pk = Some(pk.into());
        self
    }

    #[must_use]
    pub fn create_time(mut self, field: TimestampField) -> Self {
        self.create_time = field;
        self
    }

    #[must_use]
    pub fn update_time(mut self, field: TimestampField) -> Self {
        self.update_time = field;
        self
    }

    #[must_use]
    pub fn without_timestamps(self) -> Self {
        self.create_time(TimestampField::Disabled)
            .update_time(TimestampField::Disabled)
    }

    #[must_use]
    pub fn field_type(mut self, name: impl Into<String>, ty: TypeTag) -> Self {
        self.types.insert(name.into(), ty);
        self
    }

    #[must_use]
    pub fn readonly<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.readonly = strings(fields);
        self
    }

    #[must_use]
    pub fn disuse<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.disuse = strings(fields);
        self
    }

    #[must_use]
    pub fn hidden<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.hidden = strings(fields);
        self
    }

    #[must_use]
    pub fn visible<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.visible = strings(fields);
        self
    }

    #[must_use]
    pub fn append<I: IntoIterator<Item = S>, S: Into<String>>(mut self, fields: I) -> Self {
        self.append = strings(fields);
        self
    }

    #[must_use]
    pub fn mapping(mut self, field: impl Into<String>, external: impl Into<String>) -> Self {
        self.mapping.insert(field.into(), external.into());
        self
    }

    #[must_use]
    pub const fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    #[must_use]
    pub fn bind_all(mut self) -> Self {
        self.bind_attr = BindAttr::All;
        self
    }

    #[must_use]
    pub fn bind(mut self, relation: impl Into<String>, rule: BindRule) -> Self {
        let mut rules = match self.bind_attr {
            BindAttr::Relations(rules) => rules,
            BindAttr::None | BindAttr::All => IndexMap::new(),
        };
        rules.insert(relation.into(), rule);
        self.bind_attr = BindAttr::Relations(rules);
        self
    }

    #[must_use]
    pub fn auto_relation<I: IntoIterator<Item = S>, S: Into<String>>(mut self, names: I) -> Self {
        self.auto_relation = strings(names);
        self
    }

    #[must_use]
    pub fn relation_key(mut self, relation: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.relation_keys.insert(relation.into(), foreign_key.into());
        self
    }

    #[must_use]
    pub fn validate(mut self, validator: Arc<dyn Validator>) -> Self {
        self.validate = Some(validator);
        self
    }
}

/// Getter override: `(raw value, current row) -> output value`.
pub type Getter = Arc<dyn Fn(&Value, &Row) -> Value + Send + Sync>;

/// Setter override: `(candidate value, payload so far) -> storage value`.
pub type Setter = Arc<dyn Fn(&Value, &Row) -> Value + Send + Sync>;

/// Field name → accessor override registry, built once per entity type.
#[derive(Clone, Default)]
pub struct Accessors {
    getters: HashMap<String, Getter>,
    setters: HashMap<String, Setter>,
}

impl Accessors {
    pub fn getter<F>(&mut self, field: impl Into<String>, get: F) -> &mut Self
    where
        F: Fn(&Value, &Row) -> Value + Send + Sync + 'static,
    {
        self.getters.insert(field.into(), Arc::new(get));
        self
    }

    pub fn setter<F>(&mut self, field: impl Into<String>, set: F) -> &mut Self
    where
        F: Fn(&Value, &Row) -> Value + Send + Sync + 'static,
    {
        self.setters.insert(field.into(), Arc::new(set));
        self
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Getter> {
        self.getters.get(field)
    }

    #[must_use]
    pub fn set(&self, field: &str) -> Option<&Setter> {
        self.setters.get(field)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.getters.is_empty() && self.setters.is_empty()
    }
}

impl fmt::Debug for Accessors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut getters: Vec<&str> = self.getters.keys().map(String::as_str).collect();
        let mut setters: Vec<&str> = self.setters.keys().map(String::as_str).collect();
        getters.sort_unstable();
        setters.sort_unstable();
        f.debug_struct("Accessors")
            .field("getters", &getters)
            .field("setters", &setters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Plain;
    impl Model for Plain {}

    struct Other;
    impl Model for Other {
        fn name() -> &'static str {
            "other"
        }
    }

    #[test]
    fn model_refs_compare_by_type() {
        assert_eq!(ModelRef::of::<Plain>(), ModelRef::of::<Plain>());
        assert_ne!(ModelRef::of::<Plain>(), ModelRef::of::<Other>());
        assert_eq!(ModelRef::of::<Other>().name(), "other");
    }

    #[test]
    fn bind_rules_resolve_per_relation() {
        let options = EntityOptions::default()
            .bind("profile", BindRule::attrs(["bio"]))
            .bind("empty", BindRule::default());
        assert_eq!(
            options.bind_attr.rule_for("profile"),
            Some(BindRule::attrs(["bio"]))
        );
        assert_eq!(options.bind_attr.rule_for("empty"), None);
        assert_eq!(options.bind_attr.rule_for("missing"), None);
        assert_eq!(BindAttr::All.rule_for("any"), Some(BindRule::all()));
    }

    #[test]
    fn timestamp_field_resolution() {
        assert_eq!(
            TimestampField::Default.resolve(Some("update_time")),
            Some("update_time".to_string())
        );
        assert_eq!(
            TimestampField::Named("touched".into()).resolve(None),
            Some("touched".to_string())
        );
        assert_eq!(TimestampField::Disabled.resolve(Some("x")), None);
    }
}
