//! The entity: declared fields plus shadow bookkeeping, bound to a
//! persistence handle.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::binder::{RelationBinder, Resolution, bound_assignments};
use crate::error::EntityError;
use crate::model::{BindRule, Model, ModelRef};
use crate::persistence::{Database, Persistence};
use crate::schema::{Schema, SchemaResolver, real_field_name};
use crate::shadow::{Binding, Rules, ShadowState, Slot};
use crate::transform;
use crate::types::TransformContext;
use crate::value::{IntoRow, Row, Value};

/// A mapped domain object.
///
/// Declared fields live in the entity itself; load snapshots, pending
/// relation data, memoised getter output and binding policy live in a
/// private shadow state that never shows up in [`Entity::data`] or in
/// output documents.
#[derive(Clone)]
pub struct Entity {
    pub(crate) model: ModelRef,
    pub(crate) schema: Arc<Schema>,
    pub(crate) accessors: Arc<crate::model::Accessors>,
    pub(crate) fields: Row,
    pub(crate) shadow: ShadowState,
    pub(crate) db: Arc<dyn Database>,
    pub(crate) persistence: Arc<dyn Persistence>,
}

impl Entity {
    /// Build an entity of type `M` from raw data.
    pub fn new<M: Model>(db: Arc<dyn Database>, data: impl IntoRow) -> Self {
        Self::build(ModelRef::of::<M>(), db, data)
    }

    /// Build an entity from a type-erased model handle.
    pub fn build(model: ModelRef, db: Arc<dyn Database>, data: impl IntoRow) -> Self {
        let options = model.options();
        let mut binding = Binding::resolve(&options, &db.defaults());
        if binding.validator.is_none() {
            binding.validator = db.validator(model.name());
        }
        let persistence = db.bind(&binding.source, model.name(), &binding.pk);
        let schema =
            SchemaResolver::resolve(model, &options, binding.strict, Some(persistence.as_ref()));
        let accessors = SchemaResolver::accessors(model);
        let shadow = ShadowState::init(binding, Rules::from_options(&options));

        let mut entity = Self {
            model,
            schema,
            accessors,
            fields: Row::new(),
            shadow,
            db,
            persistence,
        };
        entity.initialize(data.into_row(), false);
        entity
    }

    /// Assign raw data: route keys, read-transform declared fields, resolve
    /// relation fragments and, unless this is save input, record the origin
    /// snapshot.
    pub(crate) fn initialize(&mut self, data: Row, from_save: bool) {
        let (fields, fragments) = RelationBinder::new(
            &self.shadow.binding.separator,
            self.shadow.binding.strict,
            &self.shadow.rules.mapping,
            &self.shadow.rules.disuse,
        )
        .split(data);

        let is_view = self.shadow.binding.source.is_view();
        let mut origin = Row::new();
        for (name, raw) in fields {
            let declared = self.schema.contains(&name);
            if !declared && !is_view {
                continue;
            }
            let value = if declared {
                self.read_value(&name, raw)
            } else {
                raw
            };
            if !is_view && name == self.shadow.binding.pk {
                self.shadow.key = value.clone();
            }
            self.shadow.remove(Slot::Memo, &name);
            origin.insert(name.clone(), value.clone());
            self.fields.insert(name, value);
        }

        for (relation, fragment) in fragments {
            match RelationBinder::resolve(&relation, &self.schema, &self.shadow.binding.bind_attr) {
                Resolution::Embedded(model) => {
                    let embedded = Self::build(model, Arc::clone(&self.db), fragment);
                    self.shadow.remove(Slot::Memo, &relation);
                    self.fields.insert(relation, Value::from(embedded));
                }
                Resolution::Bind(rule) => self.bind_relation_attr(&rule, &fragment),
                Resolution::Pending => {
                    for (attr, value) in fragment {
                        self.shadow.set_nested(&relation, attr, value);
                    }
                }
            }
        }

        if !origin.is_empty() && !from_save {
            self.shadow.replace_slot(Slot::Origin, origin);
        }
    }

    pub(crate) fn context<'a>(&'a self, field: &'a str) -> TransformContext<'a> {
        TransformContext::new(self.model.name(), field, &self.shadow.binding.formats)
            .with_database(&self.db)
    }

    fn read_value(&self, name: &str, raw: Value) -> Value {
        match self.schema.get(name) {
            Some(tag) => transform::read(raw, tag, &self.context(name)),
            None => raw,
        }
    }

    /// Copy relation attributes onto this entity under `rule`.
    pub fn bind_relation_attr(&mut self, rule: &BindRule, data: &Row) {
        for (name, value) in bound_assignments(rule, data, |name| self.isset(name)) {
            self.set(&name, value);
        }
    }

    fn resolve_name(&self, name: &str) -> String {
        let declared = self
            .shadow
            .rules
            .mapping
            .iter()
            .find(|(_, external)| external.as_str() == name)
            .map_or(name, |(declared, _)| declared.as_str());
        real_field_name(declared, self.shadow.binding.strict)
    }

    fn value_of(&self, name: &str) -> Option<&Value> {
        self.fields
            .get(name)
            .or_else(|| self.shadow.get(Slot::Data, name))
    }

    /// Read a field through its getter override. A null field with no
    /// getter falls back to the lazy relation loader. Non-null results are
    /// memoised until the field is next set.
    pub fn get(&mut self, name: &str) -> Value {
        let name = self.resolve_name(name);
        if let Some(memo) = self.shadow.get(Slot::Memo, &name) {
            return memo.clone();
        }
        let raw = self.value_of(&name).cloned().unwrap_or_default();
        let value = if let Some(getter) = self.accessors.get(&name) {
            getter(&raw, &self.data())
        } else if raw.is_null() {
            self.persistence
                .relation(&name, &self.data())
                .map_or(Value::Null, |relation| relation.get_relation())
        } else {
            raw
        };
        if !value.is_null() {
            self.shadow.set(Slot::Memo, name, value.clone());
        }
        value
    }

    /// Set a field. Names outside the schema are kept as extra data.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let name = self.resolve_name(name);
        self.shadow.remove(Slot::Memo, &name);
        if self.schema.contains(&name) || self.fields.contains_key(&name) {
            self.fields.insert(name, value.into());
        } else {
            self.shadow.set(Slot::Data, name, value.into());
        }
    }

    /// Like [`Entity::set`], but an entity assigned to a relation with a
    /// bind rule has its attributes copied onto this entity instead.
    pub fn assign(&mut self, name: &str, value: impl Into<Value>) {
        let value = value.into();
        if let (Value::Entity(entity), Some(rule)) =
            (&value, self.shadow.binding.bind_attr.rule_for(name))
        {
            let data = entity.data();
            self.bind_relation_attr(&rule, &data);
            return;
        }
        self.set(name, value);
    }

    #[must_use]
    pub fn isset(&self, name: &str) -> bool {
        let name = self.resolve_name(name);
        self.value_of(&name).is_some_and(|value| !value.is_null())
    }

    pub fn unset(&mut self, name: &str) {
        let name = self.resolve_name(name);
        self.shadow.remove(Slot::Memo, &name);
        if self.fields.shift_remove(&name).is_none() {
            self.shadow.set(Slot::Data, name, Value::Null);
        }
    }

    /// Add `step` to a numeric field.
    pub fn inc(&mut self, name: &str, step: f64) -> &mut Self {
        let current = self.get(name);
        self.set(name, current.add_step(step));
        self
    }

    /// Subtract `step` from a numeric field.
    pub fn dec(&mut self, name: &str, step: f64) -> &mut Self {
        self.inc(name, -step)
    }

    /// Declared fields followed by extra data, in assignment order.
    #[must_use]
    pub fn data(&self) -> Row {
        let mut data = self.fields.clone();
        data.extend(
            self.shadow
                .entries(Slot::Data)
                .iter()
                .map(|(name, value)| (name.clone(), value.clone())),
        );
        data
    }

    /// Reinitialise from new raw data, replacing the origin snapshot.
    pub fn set_data(&mut self, data: impl IntoRow) -> &mut Self {
        self.initialize(data.into_row(), false);
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.shadow.entries(Slot::Data).is_empty()
    }

    /// Values captured when the entity was loaded.
    #[must_use]
    pub fn origin(&self) -> &Row {
        self.shadow.entries(Slot::Origin)
    }

    #[must_use]
    pub fn origin_of(&self, name: &str) -> Option<&Value> {
        self.shadow.get(Slot::Origin, name)
    }

    /// Pending data of a joined relation that was not materialised.
    #[must_use]
    pub fn relation(&self, name: &str) -> Row {
        self.shadow.relation(name).cloned().unwrap_or_default()
    }

    /// Primary key value; `Null` until loaded or allocated.
    #[must_use]
    pub const fn key(&self) -> &Value {
        &self.shadow.key
    }

    pub fn set_key(&mut self, value: impl Into<Value>) {
        let value = value.into();
        let pk = self.shadow.binding.pk.clone();
        self.shadow.key = value.clone();
        self.shadow.remove(Slot::Memo, &pk);
        self.fields.insert(pk, value);
    }

    #[must_use]
    pub fn pk(&self) -> &str {
        &self.shadow.binding.pk
    }

    #[must_use]
    pub const fn is_virtual(&self) -> bool {
        self.shadow.binding.source.is_virtual()
    }

    #[must_use]
    pub const fn is_view(&self) -> bool {
        self.shadow.binding.source.is_view()
    }

    #[must_use]
    pub const fn model(&self) -> ModelRef {
        self.model
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Relations saved and deleted together with this entity.
    pub fn together<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, relations: I) -> &mut Self {
        self.shadow.together = relations.into_iter().map(Into::into).collect();
        self
    }

    /// Restrict the fields a save may write.
    pub fn allow_field<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, fields: I) -> &mut Self {
        self.shadow.rules.allow = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Always insert, and delete for real.
    pub const fn force(&mut self, force: bool) -> &mut Self {
        self.shadow.force = force;
        self
    }

    /// Insert with replace semantics.
    pub const fn replace(&mut self, replace: bool) -> &mut Self {
        self.shadow.replace = replace;
        self
    }

    /// Mark the row as existing so the next save updates it.
    pub const fn exists(&mut self, exists: bool) -> &mut Self {
        self.shadow.exists = exists;
        self
    }

    pub fn append<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, fields: I, merge: bool) -> &mut Self {
        merge_into(&mut self.shadow.rules.append, fields, merge);
        self
    }

    pub fn hidden<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, fields: I, merge: bool) -> &mut Self {
        merge_into(&mut self.shadow.rules.hidden, fields, merge);
        self
    }

    pub fn visible<I: IntoIterator<Item = S>, S: Into<String>>(&mut self, fields: I, merge: bool) -> &mut Self {
        merge_into(&mut self.shadow.rules.visible, fields, merge);
        self
    }

    /// Replace the declared → external name mapping.
    pub fn mapping<I, K, V>(&mut self, mapping: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.shadow.rules.mapping = mapping
            .into_iter()
            .map(|(field, external)| (field.into(), external.into()))
            .collect::<IndexMap<_, _>>();
        self
    }

    /// Query scope over this entity's backing source.
    ///
    /// # Errors
    ///
    /// Returns [`EntityError::Unsupported`] for virtual entities.
    pub fn query(&self) -> Result<QueryScope, EntityError> {
        if self.is_virtual() {
            return Err(EntityError::Unsupported {
                model: self.model.name().to_string(),
                reason: "virtual entities have no backing table to query".to_string(),
            });
        }
        Ok(QueryScope {
            model: self.model,
            persistence: Arc::clone(&self.persistence),
            schema: Arc::clone(&self.schema),
            with: self.shadow.binding.auto_relation.clone(),
        })
    }
}

fn merge_into<I: IntoIterator<Item = S>, S: Into<String>>(target: &mut Vec<String>, items: I, merge: bool) {
    if !merge {
        target.clear();
    }
    for item in items {
        let item = item.into();
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Entities are equal when they are of the same type with equal fields.
impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.model == other.model && self.fields == other.fields
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("model", &self.model.name())
            .field("data", &self.data())
            .field("origin", self.origin())
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Handle for building queries against an entity's backing source.
#[derive(Clone)]
pub struct QueryScope {
    model: ModelRef,
    persistence: Arc<dyn Persistence>,
    schema: Arc<Schema>,
    with: Vec<String>,
}

impl QueryScope {
    #[must_use]
    pub const fn model(&self) -> ModelRef {
        self.model
    }

    #[must_use]
    pub fn persistence(&self) -> &Arc<dyn Persistence> {
        &self.persistence
    }

    #[must_use]
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Relations eagerly loaded with every query.
    #[must_use]
    pub fn with(&self) -> &[String] {
        &self.with
    }
}

impl fmt::Debug for QueryScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryScope")
            .field("model", &self.model)
            .field("with", &self.with)
            .finish_non_exhaustive()
    }
}
