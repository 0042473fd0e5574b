use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::{ReldocError, Result};
use crate::persist::PersistenceMode;

pub const DEFAULT_CONFIG_FILE: &str = "reldoc.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Either "memory" or "file".
    pub mode: String,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogSettings {
    pub filter: String,
}

impl Settings {
    /// Defaults, then the optional file, then `RELDOC__SECTION__KEY` variables.
    pub fn load(path: Option<&str>) -> Result<Settings> {
        let settings = Config::builder()
            .set_default("database.mode", "memory")?
            .set_default("database.path", "reldoc.db")?
            .set_default("log.filter", "reldoc=info")?
            .add_source(File::with_name(path.unwrap_or(DEFAULT_CONFIG_FILE)).required(false))
            .add_source(
                Environment::with_prefix("RELDOC")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
    pub fn persistence_mode(&self) -> Result<PersistenceMode> {
        match self.database.mode.to_lowercase().as_str() {
            "memory" => Ok(PersistenceMode::InMemory),
            "file" => Ok(PersistenceMode::File(self.database.path.clone())),
            other => Err(ReldocError::Config(format!("unknown database mode '{}'", other))),
        }
    }
}
