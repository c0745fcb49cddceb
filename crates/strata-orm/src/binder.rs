//! Routing of raw input keys to fields, relation fragments and bound
//! attributes.
//!
//! Joined query results flatten relation columns as `relation__attr`. Those
//! keys accumulate per relation and are resolved once the whole input has
//! been routed.

use indexmap::IndexMap;

use crate::model::{BindAttr, BindRule, ModelRef};
use crate::schema::{real_field_name, Schema};
use crate::types::TypeTag;
use crate::value::{Row, Value};

/// Where one raw input key goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// A field of the owning entity, already mapped and normalised.
    Field(String),
    /// An attribute of a joined relation.
    Fragment { relation: String, attr: String },
}

/// How a collected relation fragment is materialised.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The schema types the relation as an entity; build it from the fragment.
    Embedded(ModelRef),
    /// Copy attributes onto the owner under a bind rule.
    Bind(BindRule),
    /// Keep as pending relation data.
    Pending,
}

/// Input-key router for one entity instance.
#[derive(Debug, Clone, Copy)]
pub struct RelationBinder<'a> {
    separator: &'a str,
    strict: bool,
    mapping: &'a IndexMap<String, String>,
    disuse: &'a [String],
}

impl<'a> RelationBinder<'a> {
    #[must_use]
    pub const fn new(
        separator: &'a str,
        strict: bool,
        mapping: &'a IndexMap<String, String>,
        disuse: &'a [String],
    ) -> Self {
        Self {
            separator,
            strict,
            mapping,
            disuse,
        }
    }

    /// External name → declared name, if the key is a mapped alias.
    #[must_use]
    pub fn unmap<'n>(&'n self, name: &'n str) -> &'n str {
        self.mapping
            .iter()
            .find(|(_, external)| external.as_str() == name)
            .map_or(name, |(declared, _)| declared.as_str())
    }

    /// Route a raw key. Disused fields yield `None`.
    #[must_use]
    pub fn route(&self, raw: &str) -> Option<Route> {
        if self.disuse.iter().any(|d| d == raw) {
            return None;
        }
        let name = self.unmap(raw);
        if let Some((relation, attr)) = name.split_once(self.separator) {
            return Some(Route::Fragment {
                relation: relation.to_string(),
                attr: attr.to_string(),
            });
        }
        Some(Route::Field(real_field_name(name, self.strict)))
    }

    /// Split raw input into owner fields and per-relation fragments,
    /// preserving input order in both.
    #[must_use]
    pub fn split(&self, data: Row) -> (Row, IndexMap<String, Row>) {
        let mut fields = Row::new();
        let mut fragments: IndexMap<String, Row> = IndexMap::new();
        for (raw, value) in data {
            match self.route(&raw) {
                Some(Route::Field(name)) => {
                    fields.insert(name, value);
                }
                Some(Route::Fragment { relation, attr }) => {
                    fragments
                        .entry(real_field_name(&relation, self.strict))
                        .or_default()
                        .insert(attr, value);
                }
                None => {}
            }
        }
        (fields, fragments)
    }

    /// Decide how a relation fragment is materialised. An entity-typed
    /// relation takes precedence over bind rules.
    #[must_use]
    pub fn resolve(relation: &str, schema: &Schema, bind: &BindAttr) -> Resolution {
        if let Some(TypeTag::Entity(model)) = schema.get(relation) {
            return Resolution::Embedded(*model);
        }
        bind.rule_for(relation)
            .map_or(Resolution::Pending, Resolution::Bind)
    }
}

/// Owner assignments produced by applying `rule` to relation data.
///
/// Renamed attributes are always assigned; listed (or all) attributes only
/// when `is_set` reports the owner field as unset.
pub fn bound_assignments(
    rule: &BindRule,
    data: &Row,
    is_set: impl Fn(&str) -> bool,
) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for (attr, value) in data {
        if let Some(target) = rule.rename.get(attr) {
            out.push((target.clone(), value.clone()));
        } else if (rule.all || rule.attrs.iter().any(|a| a == attr)) && !is_set(attr) {
            out.push((attr.clone(), value.clone()));
        }
    }
    out
}
