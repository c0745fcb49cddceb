//! Per-instance bookkeeping kept beside an entity's fields.
//!
//! Everything here is owned by exactly one [`crate::Entity`] and dropped
//! with it. None of it appears in `data()` or in output documents.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use strata_config::EntityDefaults;
use tracing::warn;

use crate::model::{BackingSource, BindAttr, EntityOptions};
use crate::persistence::{Criteria, Validator};
use crate::types::TimeFormats;
use crate::value::{Row, Value};

/// Resolved binding configuration: entity options with defaults applied.
#[derive(Clone)]
pub(crate) struct Binding {
    pub pk: String,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
    pub strict: bool,
    pub separator: String,
    pub source: BackingSource,
    pub bind_attr: BindAttr,
    pub auto_relation: Vec<String>,
    pub relation_keys: IndexMap<String, String>,
    pub validator: Option<Arc<dyn Validator>>,
    pub formats: TimeFormats,
}

impl Binding {
    pub fn resolve(options: &EntityOptions, defaults: &EntityDefaults) -> Self {
        Self {
            pk: options.pk.clone().unwrap_or_else(|| defaults.pk.clone()),
            create_time: options.create_time.resolve(defaults.create_time.as_deref()),
            update_time: options.update_time.resolve(defaults.update_time.as_deref()),
            strict: options.strict.unwrap_or(defaults.strict),
            separator: relation_separator(defaults),
            source: options.source.clone(),
            bind_attr: options.bind_attr.clone(),
            auto_relation: options.auto_relation.clone(),
            relation_keys: options.relation_keys.clone(),
            validator: options.validate.clone(),
            formats: TimeFormats::from(defaults),
        }
    }
}

/// Configured separator, or the built-in one when it is empty. An empty
/// separator would route every key to a relation.
fn relation_separator(defaults: &EntityDefaults) -> String {
    if defaults.relation_separator.is_empty() {
        warn!("empty relation separator configured, using the default");
        EntityDefaults::default().relation_separator
    } else {
        defaults.relation_separator.clone()
    }
}

/// Field exposure and writability policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Rules {
    pub allow: Vec<String>,
    pub readonly: Vec<String>,
    pub disuse: Vec<String>,
    pub hidden: Vec<String>,
    pub visible: Vec<String>,
    pub append: Vec<String>,
    pub mapping: IndexMap<String, String>,
}

impl Rules {
    pub fn from_options(options: &EntityOptions) -> Self {
        Self {
            allow: Vec::new(),
            readonly: options.readonly.clone(),
            disuse: options.disuse.clone(),
            hidden: options.hidden.clone(),
            visible: options.visible.clone(),
            append: options.append.clone(),
            mapping: options.mapping.clone(),
        }
    }
}

/// Keyed shadow slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Values captured at load time.
    Origin,
    /// Values of fields outside the schema.
    Data,
    /// Memoised getter results.
    Memo,
}

#[derive(Clone)]
pub(crate) struct ShadowState {
    pub binding: Binding,
    pub rules: Rules,
    origin: Row,
    data: Row,
    memo: Row,
    relations: IndexMap<String, Row>,
    pub together: Vec<String>,
    pub key: Value,
    pub force: bool,
    pub replace: bool,
    pub exists: bool,
    pub criteria: Option<Criteria>,
}

impl ShadowState {
    pub fn init(binding: Binding, rules: Rules) -> Self {
        Self {
            binding,
            rules,
            origin: Row::new(),
            data: Row::new(),
            memo: Row::new(),
            relations: IndexMap::new(),
            together: Vec::new(),
            key: Value::Null,
            force: false,
            replace: false,
            exists: false,
            criteria: None,
        }
    }

    const fn slot(&self, slot: Slot) -> &Row {
        match slot {
            Slot::Origin => &self.origin,
            Slot::Data => &self.data,
            Slot::Memo => &self.memo,
        }
    }

    const fn slot_mut(&mut self, slot: Slot) -> &mut Row {
        match slot {
            Slot::Origin => &mut self.origin,
            Slot::Data => &mut self.data,
            Slot::Memo => &mut self.memo,
        }
    }

    pub fn get(&self, slot: Slot, key: &str) -> Option<&Value> {
        self.slot(slot).get(key)
    }

    pub fn set(&mut self, slot: Slot, key: impl Into<String>, value: Value) {
        self.slot_mut(slot).insert(key.into(), value);
    }

    pub fn remove(&mut self, slot: Slot, key: &str) -> Option<Value> {
        self.slot_mut(slot).shift_remove(key)
    }

    /// Store one attribute of a pending relation.
    pub fn set_nested(&mut self, relation: &str, attr: impl Into<String>, value: Value) {
        self.relations
            .entry(relation.to_string())
            .or_default()
            .insert(attr.into(), value);
    }

    pub fn entries(&self, slot: Slot) -> &Row {
        self.slot(slot)
    }

    pub fn replace_slot(&mut self, slot: Slot, row: Row) {
        *self.slot_mut(slot) = row;
    }

    pub fn relation(&self, name: &str) -> Option<&Row> {
        self.relations.get(name)
    }
}

impl fmt::Debug for ShadowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowState")
            .field("origin", &self.origin)
            .field("data", &self.data)
            .field("relations", &self.relations)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TimestampField;

    #[test]
    fn binding_falls_back_to_defaults() {
        let options = EntityOptions::table("users")
            .pk("uid")
            .update_time(TimestampField::Disabled);
        let binding = Binding::resolve(&options, &EntityDefaults::default());
        assert_eq!(binding.pk, "uid");
        assert_eq!(binding.create_time.as_deref(), Some("create_time"));
        assert_eq!(binding.update_time, None);
        assert!(binding.strict);
        assert_eq!(binding.separator, "__");
    }

    #[test]
    fn empty_separator_falls_back_to_default() {
        let defaults = EntityDefaults {
            relation_separator: String::new(),
            ..EntityDefaults::default()
        };
        let binding = Binding::resolve(&EntityOptions::default(), &defaults);
        assert_eq!(binding.separator, "__");

        let defaults = EntityDefaults {
            relation_separator: ".".to_string(),
            ..EntityDefaults::default()
        };
        let binding = Binding::resolve(&EntityOptions::default(), &defaults);
        assert_eq!(binding.separator, ".");
    }

    #[test]
    fn slots_are_independent() {
        let binding = Binding::resolve(&EntityOptions::default(), &EntityDefaults::default());
        let mut shadow = ShadowState::init(binding, Rules::default());
        shadow.set(Slot::Origin, "name", Value::from("a"));
        shadow.set(Slot::Memo, "name", Value::from("A"));
        shadow.set_nested("profile", "bio", Value::from("hi"));

        assert_eq!(shadow.get(Slot::Origin, "name"), Some(&Value::from("a")));
        assert_eq!(shadow.get(Slot::Memo, "name"), Some(&Value::from("A")));
        assert_eq!(shadow.get(Slot::Data, "name"), None);
        assert_eq!(
            shadow.relation("profile").and_then(|r| r.get("bio")),
            Some(&Value::from("hi"))
        );

        shadow.remove(Slot::Memo, "name");
        assert_eq!(shadow.get(Slot::Memo, "name"), None);
    }
}
