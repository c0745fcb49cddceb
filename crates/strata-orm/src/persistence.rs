//! Collaborator traits the entity engine delegates storage to.
//!
//! The engine never talks to a database directly. A [`Database`] binds a
//! backing source to a [`Persistence`] handle; the handle executes whole-row
//! writes and deletes, reports column types for schema inference, and
//! resolves lazy relations.

use std::sync::Arc;

use indexmap::IndexMap;
use strata_config::EntityDefaults;

use crate::error::{PersistenceError, ValidationError};
use crate::model::BackingSource;
use crate::types::TypeTag;
use crate::value::{Row, Value};

/// Entry point to a storage backend.
pub trait Database: Send + Sync {
    /// Persistence handle for one backing source. `model` is the entity
    /// type name, used when the source is [`BackingSource::Model`].
    fn bind(&self, source: &BackingSource, model: &str, pk: &str) -> Arc<dyn Persistence>;

    /// Defaults used for fields an entity type does not configure.
    fn defaults(&self) -> EntityDefaults {
        EntityDefaults::default()
    }

    /// Validator for entity types that do not carry their own.
    fn validator(&self, _model: &str) -> Option<Arc<dyn Validator>> {
        None
    }
}

/// Storage operations for one bound source.
pub trait Persistence: Send + Sync {
    /// Insert or update one row.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails; a write the backend refuses
    /// without failing is reported as [`WriteOutcome::Rejected`].
    fn save(&self, write: &RowWrite) -> Result<WriteOutcome, PersistenceError>;

    /// Delete the row identified by the request key.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails.
    fn delete(&self, delete: &RowDelete) -> Result<bool, PersistenceError>;

    /// Delete every row matching the criteria.
    ///
    /// # Errors
    ///
    /// Returns an error when the backend fails.
    fn destroy(&self, criteria: &Criteria, force: bool) -> Result<bool, PersistenceError>;

    /// Column name → type, used when an entity declares no fields.
    fn fields_type(&self) -> IndexMap<String, TypeTag>;

    /// Lazy relation resolution for a field with no loaded value.
    fn relation(&self, _name: &str, _row: &Row) -> Option<Box<dyn Relation>> {
        None
    }
}

/// A resolved lazy relation.
pub trait Relation {
    fn get_relation(&self) -> Value;
}

/// Full-row validation hook.
pub trait Validator: Send + Sync {
    /// Check `data` restricted to the `allow` field list.
    ///
    /// # Errors
    ///
    /// Returns the collected failures.
    fn validate(&self, data: &Row, allow: &[String]) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&Row, &[String]) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, data: &Row, allow: &[String]) -> Result<(), ValidationError> {
        self(data, allow)
    }
}

/// Row selection for bulk operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// One or more primary key values.
    Keys(Vec<Value>),
    /// Field equality conditions.
    Where(Row),
}

impl Criteria {
    #[must_use]
    pub fn key(value: impl Into<Value>) -> Self {
        Self::Keys(vec![value.into()])
    }

    /// Whether a row matches, given its primary key field.
    #[must_use]
    pub fn matches(&self, row: &Row, pk: &str) -> bool {
        match self {
            Self::Keys(keys) => row.get(pk).is_some_and(|v| keys.contains(v)),
            Self::Where(conditions) => conditions
                .iter()
                .all(|(field, expected)| row.get(field) == Some(expected)),
        }
    }
}

/// Write request for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowWrite {
    /// Storage-ready payload.
    pub row: Row,
    /// Fields the backend may write.
    pub allow: Vec<String>,
    /// Primary key field name.
    pub pk: String,
    /// Current key value; `Null` for inserts.
    pub key: Value,
    /// Update requested by the caller even without a key.
    pub exists: bool,
    /// Always insert.
    pub force: bool,
    /// Insert-or-replace.
    pub replace: bool,
    /// Explicit update conditions.
    pub criteria: Option<Criteria>,
}

impl RowWrite {
    /// Update when a key is known or an update was requested, unless forced.
    #[must_use]
    pub fn is_update(&self) -> bool {
        (!self.key.is_null() || self.exists) && !self.force
    }
}

/// Outcome of a [`Persistence::save`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOutcome {
    /// Written; `key` carries a backend-allocated primary key, if any.
    Written { key: Option<Value> },
    Rejected,
}

/// Delete request for one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDelete {
    pub pk: String,
    pub key: Value,
    /// Full current row, for backends that match on more than the key.
    pub row: Row,
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::IntoRow;

    #[test]
    fn criteria_match_keys_and_conditions() {
        let row = [("id", Value::Int(3)), ("state", Value::from("open"))].into_row();
        assert!(Criteria::key(3).matches(&row, "id"));
        assert!(!Criteria::key(4).matches(&row, "id"));
        assert!(Criteria::Where([("state", "open")].into_row()).matches(&row, "id"));
        assert!(!Criteria::Where([("state", "closed")].into_row()).matches(&row, "id"));
    }

    #[test]
    fn write_mode_follows_key_exists_and_force() {
        let mut write = RowWrite {
            row: Row::new(),
            allow: Vec::new(),
            pk: "id".into(),
            key: Value::Null,
            exists: false,
            force: false,
            replace: false,
            criteria: None,
        };
        assert!(!write.is_update());
        write.exists = true;
        assert!(write.is_update());
        write.exists = false;
        write.key = Value::Int(1);
        assert!(write.is_update());
        write.force = true;
        assert!(!write.is_update());
    }

    #[test]
    fn closures_are_validators() {
        let reject = |data: &Row, _allow: &[String]| {
            if data.contains_key("name") {
                Ok(())
            } else {
                Err(ValidationError::single("name is required"))
            }
        };
        assert!(reject.validate(&Row::new(), &[]).is_err());
        assert!(reject.validate(&[("name", "x")].into_row(), &[]).is_ok());
    }
}
