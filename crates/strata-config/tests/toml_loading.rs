//! Integration tests for TOML configuration loading.
//!
//! Uses figment::Jail for sandboxed file and env var manipulation.

use figment::{
    Figment, Jail,
    providers::{Format, Serialized, Toml},
};
use pretty_assertions::assert_eq;
use strata_config::{EntityDefaults, StrataConfig};

#[test]
fn loads_entity_defaults_from_toml() {
    Jail::expect_with(|jail| {
        jail.create_file(
            "config.toml",
            r#"
[entity]
pk = "uid"
strict = false
create_time = "created_at"
datetime_format = "%Y/%m/%d %H:%M"
"#,
        )?;

        let config: StrataConfig = Figment::from(Serialized::defaults(StrataConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.entity.pk, "uid");
        assert!(!config.entity.strict);
        assert_eq!(config.entity.create_time.as_deref(), Some("created_at"));
        assert_eq!(config.entity.update_time.as_deref(), Some("update_time"));
        assert_eq!(config.entity.datetime_format, "%Y/%m/%d %H:%M");
        assert_eq!(config.entity.date_format, "%Y-%m-%d");
        Ok(())
    });
}

#[test]
fn project_config_is_picked_up_by_load() {
    Jail::expect_with(|jail| {
        jail.create_dir(".strata")?;
        jail.create_file(
            ".strata/config.toml",
            r#"
[entity]
relation_separator = "::"
"#,
        )?;

        let config = StrataConfig::load().expect("config loads");
        assert_eq!(config.entity.relation_separator, "::");
        Ok(())
    });
}

#[test]
fn invalid_project_config_is_rejected() {
    Jail::expect_with(|jail| {
        jail.create_dir(".strata")?;
        jail.create_file(
            ".strata/config.toml",
            r#"
[entity]
pk = ""
"#,
        )?;

        assert!(StrataConfig::load().is_err());
        Ok(())
    });
}

#[test]
fn missing_sections_fall_back_to_defaults() {
    Jail::expect_with(|jail| {
        jail.create_file("config.toml", "")?;

        let config: StrataConfig = Figment::from(Serialized::defaults(StrataConfig::default()))
            .merge(Toml::file("config.toml"))
            .extract()?;

        assert_eq!(config.entity, EntityDefaults::default());
        Ok(())
    });
}
