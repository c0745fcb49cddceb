//! Output projection.

use indexmap::IndexMap;

use crate::entity::Entity;
use crate::shadow::Slot;
use crate::value::{Row, Value};

/// Visibility rules pushed down to one embedded relation.
#[derive(Debug, Default)]
struct Nested {
    visible: Vec<String>,
    hidden: Vec<String>,
    append: Vec<String>,
}

/// Split `relation.attr` entries from plain ones.
fn split_rules(
    rules: &[String],
    nested: &mut IndexMap<String, Nested>,
    pick: fn(&mut Nested) -> &mut Vec<String>,
) -> Vec<String> {
    let mut local = Vec::new();
    for rule in rules {
        match rule.split_once('.') {
            Some((relation, attr)) => {
                pick(nested.entry(relation.to_string()).or_default()).push(attr.to_string());
            }
            None => local.push(rule.clone()),
        }
    }
    local
}

impl Nested {
    fn visible(&mut self) -> &mut Vec<String> {
        &mut self.visible
    }

    fn hidden(&mut self) -> &mut Vec<String> {
        &mut self.hidden
    }

    fn append(&mut self) -> &mut Vec<String> {
        &mut self.append
    }

    fn apply(&self, entity: &mut Entity) {
        if !self.visible.is_empty() {
            entity.visible(self.visible.iter().cloned(), false);
        }
        if !self.hidden.is_empty() {
            entity.hidden(self.hidden.iter().cloned(), false);
        }
        if !self.append.is_empty() {
            entity.append(self.append.iter().cloned(), false);
        }
    }
}

impl Entity {
    /// Project the entity into an ordered JSON object.
    ///
    /// Without an explicit `allow` list the output holds the visible fields
    /// (all fields when none are marked visible) minus hidden ones. Embedded
    /// entities and collections are serialised recursively with any
    /// `relation.attr` rules pushed down to them. Mapped fields are renamed,
    /// and appended fields are read through [`Entity::get`].
    pub fn to_document(&mut self, allow: Option<&[String]>) -> serde_json::Map<String, serde_json::Value> {
        let rules = self.shadow.rules.clone();
        let mut nested: IndexMap<String, Nested> = IndexMap::new();
        let visible = split_rules(&rules.visible, &mut nested, Nested::visible);
        let hidden = split_rules(&rules.hidden, &mut nested, Nested::hidden);
        let append = split_rules(&rules.append, &mut nested, Nested::append);

        let row = self.data();
        let allow: Vec<String> = match allow {
            Some(allow) if !allow.is_empty() => allow.to_vec(),
            _ => {
                let base: Vec<String> = if visible.is_empty() {
                    row.keys().cloned().collect()
                } else {
                    visible
                };
                base.into_iter().filter(|name| !hidden.contains(name)).collect()
            }
        };

        let mut out = serde_json::Map::new();
        for (name, value) in &row {
            let included = allow.contains(name);
            let pushed = nested.get(name);
            let item = match value {
                Value::Entity(entity) => {
                    if !included && pushed.is_none() {
                        continue;
                    }
                    let mut entity = entity.as_ref().clone();
                    if let Some(rules) = pushed {
                        rules.apply(&mut entity);
                    }
                    serde_json::Value::Object(entity.to_document(None))
                }
                Value::Collection(items) => {
                    if !included && pushed.is_none() {
                        continue;
                    }
                    serde_json::Value::Array(
                        items
                            .iter()
                            .map(|item| {
                                let mut item = item.clone();
                                if let Some(rules) = pushed {
                                    rules.apply(&mut item);
                                }
                                serde_json::Value::Object(item.to_document(None))
                            })
                            .collect(),
                    )
                }
                _ if !included => continue,
                Value::Rich(_) => value.to_plain(&self.context(name)),
                _ => self.output_value(name, value, &row),
            };
            let key = rules.mapping.get(name).unwrap_or(name).clone();
            out.insert(key, item);
        }

        for name in append {
            let value = self.get(&name);
            let plain = value.to_plain(&self.context(&name));
            out.insert(name, plain);
        }
        out
    }

    /// Getter output for a plain field, memoised.
    fn output_value(&mut self, name: &str, value: &Value, row: &Row) -> serde_json::Value {
        let output = if let Some(memo) = self.shadow.get(Slot::Memo, name) {
            memo.clone()
        } else if let Some(getter) = self.accessors.get(name) {
            let output = getter(value, row);
            self.shadow.set(Slot::Memo, name, output.clone());
            output
        } else {
            value.clone()
        };
        output.to_plain(&self.context(name))
    }

    /// [`Entity::to_document`] serialised as JSON text.
    pub fn to_json(&mut self) -> String {
        serde_json::Value::Object(self.to_document(None)).to_string()
    }
}
