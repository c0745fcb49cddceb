//! Central schema registry for entity payloads.
//!
//! The `SchemaRegistry` builds JSON Schemas from Rust payload types with
//! [`schemars::schema_for!`], or accepts hand-written schema documents, and
//! validates instances with `jsonschema`.

use std::collections::HashMap;
use std::sync::Arc;

use schemars::{JsonSchema, schema_for};
use tracing::debug;

use crate::error::SchemaError;
use crate::validator::SchemaValidator;

/// Store of JSON Schemas keyed by entity name.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, serde_json::Value>,
}

impl SchemaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the schema generated for `T` under `name`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::Generation` if the generated schema cannot be
    /// converted to JSON.
    pub fn register<T: JsonSchema>(&mut self, name: impl Into<String>) -> Result<&mut Self, SchemaError> {
        let schema = serde_json::to_value(schema_for!(T))
            .map_err(|e| SchemaError::Generation(e.to_string()))?;
        Ok(self.register_value(name, schema))
    }

    /// Register a raw schema document under `name`, replacing any previous one.
    pub fn register_value(&mut self, name: impl Into<String>, schema: serde_json::Value) -> &mut Self {
        let name = name.into();
        debug!(schema = %name, "registered schema");
        self.schemas.insert(name, schema);
        self
    }

    /// Get a schema by name. Returns `None` if not found.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.schemas.get(name)
    }

    /// Validate a JSON value against a named schema.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NotFound` if the schema name is unknown,
    /// `SchemaError::Generation` if the schema does not compile, or
    /// `SchemaError::ValidationFailed` if validation produces errors.
    pub fn validate(&self, name: &str, instance: &serde_json::Value) -> Result<(), SchemaError> {
        check(self.lookup(name)?, instance)
    }

    /// Validate only the fields named in `scope`.
    ///
    /// Object instances are reduced to the scoped fields and the schema's
    /// `required` list is narrowed to match, so fields outside the scope are
    /// neither checked nor demanded.
    ///
    /// # Errors
    ///
    /// Same as [`SchemaRegistry::validate`].
    pub fn validate_scoped(
        &self,
        name: &str,
        instance: &serde_json::Value,
        scope: &[String],
    ) -> Result<(), SchemaError> {
        let schema = scope_schema(self.lookup(name)?, scope);
        check(&schema, &scope_instance(instance, scope))
    }

    /// Validation collaborator for entities checked against `name`.
    ///
    /// # Errors
    ///
    /// Returns `SchemaError::NotFound` if the schema name is unknown.
    pub fn validator(&self, name: &str) -> Result<Arc<dyn strata_orm::Validator>, SchemaError> {
        let schema = self.lookup(name)?.clone();
        Ok(Arc::new(SchemaValidator::new(name, schema)))
    }

    /// List all registered schema names.
    #[must_use]
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.schemas.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered schemas.
    #[must_use]
    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    fn lookup(&self, name: &str) -> Result<&serde_json::Value, SchemaError> {
        self.get(name)
            .ok_or_else(|| SchemaError::NotFound(name.to_string()))
    }
}

/// Compile `schema` and collect every error `instance` produces.
pub(crate) fn check(schema: &serde_json::Value, instance: &serde_json::Value) -> Result<(), SchemaError> {
    let validator =
        jsonschema::validator_for(schema).map_err(|e| SchemaError::Generation(format!("{e}")))?;

    let errors: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| format!("{e}"))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(SchemaError::ValidationFailed { errors })
    }
}

/// Copy of `schema` whose top-level `required` list only names scoped fields.
pub(crate) fn scope_schema(schema: &serde_json::Value, scope: &[String]) -> serde_json::Value {
    let mut schema = schema.clone();
    if let Some(required) = schema
        .get_mut("required")
        .and_then(serde_json::Value::as_array_mut)
    {
        required.retain(|field| {
            field
                .as_str()
                .is_some_and(|field| scope.iter().any(|s| s == field))
        });
    }
    schema
}

/// Object instances reduced to the scoped fields; anything else unchanged.
pub(crate) fn scope_instance(instance: &serde_json::Value, scope: &[String]) -> serde_json::Value {
    match instance {
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .filter(|(name, _)| scope.contains(*name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}
