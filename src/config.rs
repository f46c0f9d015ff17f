//! Configuration management for the vehicle ledger

use crate::error::{LedgerError, Result};
use crate::miner::DEFAULT_DIFFICULTY_BITS;
use serde::Deserialize;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    #[serde(default = "default_difficulty_bits")]
    pub difficulty_bits: u32,
    #[serde(default = "default_cache_capacity")]
    pub block_cache_capacity: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            difficulty_bits: default_difficulty_bits(),
            block_cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_db_path() -> String {
    "./data/blockchain.db".to_string()
}

fn default_difficulty_bits() -> u32 {
    DEFAULT_DIFFICULTY_BITS
}

fn default_cache_capacity() -> usize {
    100
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)
            .map_err(|e| LedgerError::Config(format!("Invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.path.is_empty() {
            return Err(LedgerError::Config("database.path must be set".to_string()));
        }
        if self.chain.difficulty_bits > 256 {
            return Err(LedgerError::Config(format!(
                "chain.difficulty_bits must be at most 256, got {}",
                self.chain.difficulty_bits
            )));
        }
        Ok(())
    }
}

/// Load `config.toml` from the working directory, falling back to defaults when absent.
pub fn load_config() -> Result<Config> {
    load_config_from(DEFAULT_CONFIG_PATH)
}

pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(text) => Config::from_toml(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(Config::default()),
        Err(e) => Err(LedgerError::Config(format!(
            "Failed to read {}: {}",
            path.display(),
            e
        ))),
    }
}
