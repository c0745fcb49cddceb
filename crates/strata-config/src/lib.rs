//! # strata-config
//!
//! Layered configuration loading for Strata using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`STRATA_*` prefix, `__` as separator)
//! 2. Project-level `.strata/config.toml`
//! 3. User-level `~/.config/strata/config.toml`
//! 4. Built-in defaults
//!
//! # Environment Variable Mapping
//!
//! Figment maps `STRATA_ENTITY__PK` -> `entity.pk`,
//! `STRATA_ENTITY__DATETIME_FORMAT` -> `entity.datetime_format`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use strata_config::StrataConfig;
//!
//! let config = StrataConfig::load_with_dotenv().expect("config");
//! println!("primary key: {}", config.entity.pk);
//! ```

mod entity;
mod error;

pub use entity::EntityDefaults;
pub use error::ConfigError;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StrataConfig {
    #[serde(default)]
    pub entity: EntityDefaults,
}

impl StrataConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy` -- use [`Self::load_with_dotenv`] if you need `.env` file loading.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration with `.env` file support.
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        Self::load_dotenv_from_workspace();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests can inspect the figment directly or add providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".strata/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("STRATA_").split("__"))
    }

    /// Reject values the mapping engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.entity.validate()
    }

    fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("strata").join("config.toml"))
    }

    /// Load `.env` from the workspace root, falling back to the current directory.
    fn load_dotenv_from_workspace() {
        if let Ok(manifest_dir) = std::env::var("CARGO_MANIFEST_DIR") {
            let mut dir = PathBuf::from(manifest_dir);
            // crate -> crates/ -> workspace root
            for _ in 0..3 {
                let env_path = dir.join(".env");
                if env_path.exists() {
                    let _ = dotenvy::from_path(&env_path);
                    return;
                }
                if !dir.pop() {
                    break;
                }
            }
        }

        let _ = dotenvy::dotenv();
    }
}
