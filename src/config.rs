use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GraphError, Result};

/// Which storage backend a context opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Memory,
    File,
    Sqlite,
}

impl BackendKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(BackendKind::Memory),
            "file" => Ok(BackendKind::File),
            "sqlite" => Ok(BackendKind::Sqlite),
            other => Err(GraphError::validation(format!(
                "DB_TYPE '{other}' must be 'memory', 'file', or 'sqlite'"
            ))),
        }
    }
}

/// Runaway-protection limits applied to every walker driven under a context.
///
/// Individual walkers may override their own copy before spawning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectionConfig {
    pub enabled: bool,
    pub max_steps: u64,
    pub max_visits_per_node: u64,
    pub max_execution_time: Duration,
    pub max_queue_size: usize,
}

impl Default for ProtectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_steps: 10_000,
            max_visits_per_node: 100,
            max_execution_time: Duration::from_secs(300),
            max_queue_size: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub backend: BackendKind,
    /// Root directory for the file backend, one `<collection>.json` per collection.
    pub file_db_path: PathBuf,
    /// Database file for the sqlite document-store backend.
    pub sqlite_db_path: PathBuf,
    pub protection: ProtectionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::File,
            file_db_path: PathBuf::from("./data"),
            sqlite_db_path: PathBuf::from("./data/graph.db"),
            protection: ProtectionConfig::default(),
        }
    }
}

impl Config {
    /// In-memory configuration, the usual choice for tests.
    pub fn memory() -> Self {
        Self {
            backend: BackendKind::Memory,
            ..Self::default()
        }
    }

    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::File,
            file_db_path: path.into(),
            ..Self::default()
        }
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: BackendKind::Sqlite,
            sqlite_db_path: path.into(),
            ..Self::default()
        }
    }

    /// Reads the process-wide configuration from the environment.
    ///
    /// Unset keys fall back to defaults; present-but-malformed values are
    /// rejected rather than silently ignored.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        if let Some(value) = read_env("DB_TYPE") {
            config.backend = BackendKind::parse(&value)?;
        }
        if let Some(value) = read_env("FILE_DB_PATH") {
            config.file_db_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("SQLITE_DB_PATH") {
            config.sqlite_db_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("WALKER_PROTECTION_ENABLED") {
            config.protection.enabled = parse_bool("WALKER_PROTECTION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("WALKER_MAX_STEPS") {
            config.protection.max_steps = parse_u64("WALKER_MAX_STEPS", &value)?;
        }
        if let Some(value) = read_env("WALKER_MAX_VISITS_PER_NODE") {
            config.protection.max_visits_per_node = parse_u64("WALKER_MAX_VISITS_PER_NODE", &value)?;
        }
        if let Some(value) = read_env("WALKER_MAX_EXECUTION_TIME") {
            config.protection.max_execution_time =
                Duration::from_secs(parse_u64("WALKER_MAX_EXECUTION_TIME", &value)?);
        }
        if let Some(value) = read_env("WALKER_MAX_QUEUE_SIZE") {
            config.protection.max_queue_size = parse_u64("WALKER_MAX_QUEUE_SIZE", &value)? as usize;
        }
        Ok(config)
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(GraphError::validation(format!(
            "{key} '{other}' is not a boolean"
        ))),
    }
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse::<u64>()
        .map_err(|_| GraphError::validation(format!("{key} '{value}' is not a non-negative integer")))
}
