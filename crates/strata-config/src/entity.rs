//! Process-wide fallbacks for entity binding options.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

fn default_pk() -> String {
    "id".to_string()
}

fn default_create_time() -> Option<String> {
    Some("create_time".to_string())
}

fn default_update_time() -> Option<String> {
    Some("update_time".to_string())
}

const fn default_strict() -> bool {
    true
}

fn default_separator() -> String {
    "__".to_string()
}

fn default_date_format() -> String {
    "%Y-%m-%d".to_string()
}

fn default_datetime_format() -> String {
    "%Y-%m-%d %H:%M:%S".to_string()
}

/// Defaults applied to every entity type that does not override them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct EntityDefaults {
    /// Primary key field name.
    #[serde(default = "default_pk")]
    pub pk: String,

    /// Creation timestamp field. `None` disables auto-stamping.
    #[serde(default = "default_create_time")]
    pub create_time: Option<String>,

    /// Update timestamp field. `None` disables auto-stamping.
    #[serde(default = "default_update_time")]
    pub update_time: Option<String>,

    /// Strict naming keeps field names verbatim; otherwise names are snake_cased.
    #[serde(default = "default_strict")]
    pub strict: bool,

    /// Separator between relation name and attribute in joined result keys.
    #[serde(default = "default_separator")]
    pub relation_separator: String,

    /// `chrono` format used to store `date` fields.
    #[serde(default = "default_date_format")]
    pub date_format: String,

    /// `chrono` format used to store `datetime` fields.
    #[serde(default = "default_datetime_format")]
    pub datetime_format: String,
}

impl EntityDefaults {
    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.pk.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "entity.pk".to_string(),
                reason: "primary key name must not be empty".to_string(),
            });
        }
        if self.relation_separator.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "entity.relation_separator".to_string(),
                reason: "separator must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for EntityDefaults {
    fn default() -> Self {
        Self {
            pk: default_pk(),
            create_time: default_create_time(),
            update_time: default_update_time(),
            strict: default_strict(),
            relation_separator: default_separator(),
            date_format: default_date_format(),
            datetime_format: default_datetime_format(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_correct() {
        let defaults = EntityDefaults::default();
        assert_eq!(defaults.pk, "id");
        assert_eq!(defaults.create_time.as_deref(), Some("create_time"));
        assert_eq!(defaults.date_format, "%Y-%m-%d");
        assert_eq!(defaults.datetime_format, "%Y-%m-%d %H:%M:%S");
    }

    #[test]
    fn empty_pk_is_rejected() {
        let defaults = EntityDefaults {
            pk: "  ".to_string(),
            ..EntityDefaults::default()
        };
        assert!(matches!(
            defaults.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_separator_is_rejected() {
        let defaults = EntityDefaults {
            relation_separator: String::new(),
            ..EntityDefaults::default()
        };
        assert!(defaults.validate().is_err());
    }
}
