//! Schema-backed validation collaborator.

use strata_orm::{Row, ValidationError, Validator};
use tracing::debug;

use crate::registry::{check, scope_instance, scope_schema};

/// Validates entity data against one registered JSON Schema.
///
/// Only the fields a save may write are checked: the row is reduced to the
/// allow-list and the schema's `required` list narrowed to it. An empty
/// allow-list checks the whole row.
#[derive(Debug, Clone)]
pub struct SchemaValidator {
    name: String,
    schema: serde_json::Value,
}

impl SchemaValidator {
    #[must_use]
    pub fn new(name: impl Into<String>, schema: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Plain JSON object for a row; rich values use their default rendering.
fn row_instance(data: &Row) -> serde_json::Value {
    serde_json::Value::Object(
        data.iter()
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect(),
    )
}

impl Validator for SchemaValidator {
    fn validate(&self, data: &Row, allow: &[String]) -> Result<(), ValidationError> {
        let instance = row_instance(data);
        let result = if allow.is_empty() {
            check(&self.schema, &instance)
        } else {
            check(
                &scope_schema(&self.schema, allow),
                &scope_instance(&instance, allow),
            )
        };
        result.map_err(|e| {
            debug!(schema = %self.name, error = %e, "entity data rejected");
            ValidationError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use strata_orm::{IntoRow, Value};

    fn validator() -> SchemaValidator {
        SchemaValidator::new(
            "task",
            json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string", "minLength": 1},
                    "done": {"type": "boolean"}
                },
                "required": ["title", "done"]
            }),
        )
    }

    #[test]
    fn full_rows_are_checked_without_allow_list() {
        let row = [("title", Value::from("x")), ("done", Value::Bool(false))].into_row();
        assert!(validator().validate(&row, &[]).is_ok());

        let err = validator()
            .validate(&[("title", "x")].into_row(), &[])
            .unwrap_err();
        assert_eq!(err.errors.len(), 1);
        assert!(err.errors[0].contains("done"));
    }

    #[test]
    fn allow_list_limits_what_is_checked() {
        let allow = vec!["title".to_string()];
        assert!(validator()
            .validate(&[("title", Value::from("x")), ("done", Value::from("nope"))].into_row(), &allow)
            .is_ok());
        assert!(validator()
            .validate(&[("title", "")].into_row(), &allow)
            .is_err());
    }
}
