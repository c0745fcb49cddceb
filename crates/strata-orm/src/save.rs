//! Dirty tracking, save and delete.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::EntityError;
use crate::model::{Model, ModelRef};
use crate::persistence::{Criteria, Database, RowDelete, RowWrite, WriteOutcome};
use crate::shadow::Slot;
use crate::transform;
use crate::types::{DateTime, RichValue, TypeTag};
use crate::value::{IntoRow, Row, Value};

impl Entity {
    /// Persist pending changes.
    ///
    /// Returns `Ok(false)` when nothing is left to write or the backend
    /// rejected the row.
    ///
    /// # Errors
    ///
    /// Fails when validation rejects the data or persistence fails.
    pub fn save(&mut self) -> Result<bool, EntityError> {
        self.save_with(Row::new())
    }

    /// Merge `data` into the entity, then [`Entity::save`].
    ///
    /// # Errors
    ///
    /// Fails when validation rejects the data or persistence fails.
    pub fn save_with(&mut self, data: impl IntoRow) -> Result<bool, EntityError> {
        let data = data.into_row();
        if !data.is_empty() {
            self.initialize(data, true);
        }

        if self.shadow.binding.source.is_detached() {
            debug!(model = self.model.name(), "detached entity, save skipped");
            return Ok(true);
        }

        let mut allow = self.writable_fields();
        let data = self.data();
        if let Some(validator) = &self.shadow.binding.validator {
            validator.validate(&data, &allow)?;
        }

        let is_update = (!self.shadow.key.is_null() || self.shadow.exists) && !self.shadow.force;
        let pk = self.shadow.binding.pk.clone();
        let mut payload = Row::new();
        let mut relations: Vec<(String, Value)> = Vec::new();

        for (name, value) in data {
            if matches!(value, Value::Entity(_)) || self.schema.is_entity(&name) {
                relations.push((name, value));
                continue;
            }
            if matches!(value, Value::Collection(_)) || !allow.contains(&name) {
                continue;
            }
            if is_update && (name == pk || self.origin_of(&name) == Some(&value)) {
                continue;
            }
            let stored = match self.accessors.set(&name) {
                Some(setter) => setter(&value, &payload),
                None => match self.schema.get(&name) {
                    Some(tag) => transform::write(value, tag, &self.context(&name)),
                    None => value,
                },
            };
            payload.insert(name, stored);
        }

        if payload.is_empty() {
            debug!(model = self.model.name(), "no changed fields, save skipped");
            return Ok(false);
        }

        self.stamp_times(&mut payload, &mut allow, is_update);

        let write = RowWrite {
            row: payload,
            allow,
            pk,
            key: self.shadow.key.clone(),
            exists: self.shadow.exists,
            force: self.shadow.force,
            replace: self.shadow.replace,
            criteria: self.shadow.criteria.clone(),
        };
        match self.persistence.save(&write)? {
            WriteOutcome::Rejected => return Ok(false),
            WriteOutcome::Written { key } => {
                if let Some(key) = key.filter(|_| self.shadow.key.is_null()) {
                    self.set_key(key);
                }
            }
        }

        self.refresh_origin();
        self.save_relations(relations);
        Ok(true)
    }

    /// Allow-list, defaulting to every schema field, minus readonly and
    /// disused fields.
    fn writable_fields(&self) -> Vec<String> {
        let rules = &self.shadow.rules;
        let candidates: Vec<String> = if rules.allow.is_empty() {
            self.schema.names().map(str::to_string).collect()
        } else {
            rules.allow.clone()
        };
        candidates
            .into_iter()
            .filter(|name| !rules.readonly.contains(name) && !rules.disuse.contains(name))
            .collect()
    }

    /// Fill the creation (inserts only) and update timestamp fields that the
    /// schema declares, and mirror the values onto the entity.
    fn stamp_times(&mut self, payload: &mut Row, allow: &mut Vec<String>, is_update: bool) {
        let binding = &self.shadow.binding;
        let fields: Vec<String> = [
            binding.create_time.clone().filter(|_| !is_update),
            binding.update_time.clone(),
        ]
        .into_iter()
        .flatten()
        .filter(|field| self.schema.contains(field))
        .collect();

        for field in fields {
            let Some(tag) = self.schema.get(&field).cloned() else {
                continue;
            };
            let stored = self.current_time(&field, &tag);
            let domain = transform::read(stored.clone(), &tag, &self.context(&field));
            payload.insert(field.clone(), stored);
            if !allow.contains(&field) {
                allow.push(field.clone());
            }
            self.shadow.remove(Slot::Memo, &field);
            self.fields.insert(field, domain);
        }
    }

    /// Storage value of "now" for a timestamp field of type `tag`.
    fn current_time(&self, field: &str, tag: &TypeTag) -> Value {
        let ctx = self.context(field);
        match tag {
            TypeTag::Int => Value::Int(chrono::Utc::now().timestamp()),
            TypeTag::Date | TypeTag::DateTime | TypeTag::Timestamp | TypeTag::Rich(_) => {
                transform::write(transform::read(Value::from("now"), tag, &ctx), tag, &ctx)
            }
            _ => DateTime::now()
                .to_storage(&ctx)
                .unwrap_or_else(|| Value::from("now")),
        }
    }

    /// Snapshot the written state so the next save only sends new changes.
    fn refresh_origin(&mut self) {
        let origin: Row = self
            .fields
            .iter()
            .filter(|(_, value)| !value.is_relation())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        self.shadow.replace_slot(Slot::Origin, origin);
    }

    /// Save "together" relations after the owner, stitching the owner key
    /// into the declared foreign key first. Failures are logged, not raised.
    fn save_relations(&mut self, relations: Vec<(String, Value)>) {
        for (name, mut value) in relations {
            let cascade = self.shadow.together.contains(&name);
            if let Some(relation) = value.as_entity_mut().filter(|_| cascade) {
                if let Some(foreign_key) = self.shadow.binding.relation_keys.get(&name) {
                    relation.set(foreign_key, self.shadow.key.clone());
                }
                match relation.save() {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(owner = self.model.name(), relation = %name, "relation save wrote nothing");
                    }
                    Err(e) => {
                        warn!(owner = self.model.name(), relation = %name, error = %e, "relation save failed");
                    }
                }
            }
            if self.fields.contains_key(&name) {
                self.fields.insert(name, value);
            } else if self.shadow.get(Slot::Data, &name).is_some() {
                self.shadow.set(Slot::Data, name, value);
            }
        }
    }

    /// Delete this entity's row, then its "together" relations.
    ///
    /// # Errors
    ///
    /// Fails when persistence fails for the owner row.
    pub fn delete(&mut self) -> Result<bool, EntityError> {
        if self.shadow.binding.source.is_detached() {
            debug!(model = self.model.name(), "detached entity, delete skipped");
            return Ok(true);
        }

        let relations: Vec<(String, Value)> = self
            .data()
            .into_iter()
            .filter(|(_, value)| value.is_relation())
            .collect();

        let deleted = self.persistence.delete(&RowDelete {
            pk: self.shadow.binding.pk.clone(),
            key: self.shadow.key.clone(),
            row: self.data(),
            force: self.shadow.force,
        })?;

        if deleted {
            for (name, value) in relations {
                if !self.shadow.together.contains(&name) {
                    continue;
                }
                let mut items = match value {
                    Value::Entity(entity) => vec![*entity],
                    Value::Collection(items) => items,
                    _ => Vec::new(),
                };
                for item in &mut items {
                    if let Err(e) = item.delete() {
                        warn!(owner = self.model.name(), relation = %name, error = %e, "relation delete failed");
                    }
                }
            }
        }
        Ok(deleted)
    }

    /// Insert a new entity of type `M`.
    ///
    /// # Errors
    ///
    /// Same as [`Entity::save`].
    pub fn create<M: Model>(
        db: Arc<dyn Database>,
        data: impl IntoRow,
        allow: &[&str],
        replace: bool,
    ) -> Result<Self, EntityError> {
        let mut entity = Self::build(ModelRef::of::<M>(), db, Row::new());
        if !allow.is_empty() {
            entity.allow_field(allow.iter().copied());
        }
        entity.replace(replace);
        entity.save_with(data)?;
        Ok(entity)
    }

    /// Update existing rows of type `M`, by key or by `criteria`.
    ///
    /// # Errors
    ///
    /// Same as [`Entity::save`].
    pub fn update<M: Model>(
        db: Arc<dyn Database>,
        data: impl IntoRow,
        criteria: Option<Criteria>,
        allow: &[&str],
    ) -> Result<Self, EntityError> {
        let mut entity = Self::build(ModelRef::of::<M>(), db, Row::new());
        if !allow.is_empty() {
            entity.allow_field(allow.iter().copied());
        }
        entity.shadow.criteria = criteria;
        entity.exists(true);
        entity.save_with(data)?;
        Ok(entity)
    }

    /// Delete rows of type `M` matching `criteria`.
    ///
    /// # Errors
    ///
    /// Fails when persistence fails.
    pub fn destroy<M: Model>(
        db: Arc<dyn Database>,
        criteria: &Criteria,
        force: bool,
    ) -> Result<bool, EntityError> {
        let entity = Self::build(ModelRef::of::<M>(), db, Row::new());
        if entity.shadow.binding.source.is_detached() {
            return Ok(true);
        }
        Ok(entity.persistence.destroy(criteria, force)?)
    }
}
