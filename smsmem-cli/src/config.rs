use anyhow::Context;
use serde::{Deserialize, Serialize};
use smsmem_core::BusConfig;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,

    #[serde(default = "default_dump_bytes_per_line")]
    pub dump_bytes_per_line: usize,
}

fn default_dump_bytes_per_line() -> usize {
    16
}

impl Default for AppConfig {
    fn default() -> Self {
        Self { bus: BusConfig::default(), dump_bytes_per_line: default_dump_bytes_per_line() }
    }
}

impl AppConfig {
    pub fn from_toml_file<P>(path: P) -> Result<Self, anyhow::Error>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("error reading TOML config file from '{path:?}'"))?;
        let config: Self = toml::from_str(&config_str)
            .with_context(|| format!("error parsing app config from TOML file at '{path:?}'"))?;

        Ok(config)
    }
}
