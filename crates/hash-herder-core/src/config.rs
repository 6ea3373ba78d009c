use config::{Config, ConfigError, Environment, File as ConfigFile};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::engine::DispositionMode;
use crate::error::Error;
use crate::identity::IdentityPolicy;

pub const DEFAULT_DATABASE_PATH: &str = "~/.hash-herder/hashes.db";
pub const DEFAULT_FILES_PER_DIR: usize = 500;
pub const ENV_PREFIX: &str = "HASH_HERDER";

/// Commented starter file written by `hash-herder init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# hash-herder configuration

[database]
path = "~/.hash-herder/hashes.db"

[performance]
# 1 hashes on the scanning thread; more starts a hashing pool
workers = 1

[logging]
level = "info"
# file = "~/.hash-herder/hash-herder.log"

[dedup]
mode = "delete"          # delete | move
# target_dir = "/data/duplicates"
identity = "hash"        # hash | hash-size | full

[classify]
files_per_dir = 500

[scanner]
ignore_patterns = []
skip_empty = false

[ledger]
# dir = "/var/tmp/hash-herder"
"#;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub performance: PerformanceConfig,
    pub logging: LoggingConfig,
    pub dedup: DedupConfig,
    pub classify: ClassifyConfig,
    pub scanner: ScannerConfig,
    pub ledger: LedgerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_DATABASE_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub workers: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { workers: 1 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub mode: DispositionMode,
    pub target_dir: Option<String>,
    pub identity: IdentityPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    pub files_per_dir: usize,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            files_per_dir: DEFAULT_FILES_PER_DIR,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub ignore_patterns: Vec<String>,
    pub skip_empty: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub dir: Option<String>,
}

impl AppConfig {
    pub fn database_path(&self) -> PathBuf {
        expand_tilde(&self.database.path)
    }

    pub fn ledger_dir(&self) -> Option<PathBuf> {
        self.ledger.dir.as_deref().map(expand_tilde)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.performance.workers == 0 {
            return Err(Error::InvalidConfig(
                "performance.workers must be at least 1".to_string(),
            ));
        }
        if self.classify.files_per_dir == 0 {
            return Err(Error::InvalidConfig(
                "classify.files_per_dir must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-user config file location, e.g. `~/.config/hash-herder/config.toml`.
pub fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("hash-herder").join("config.toml"))
}

/// Layer the configuration sources, lowest priority first: built-in
/// defaults, `HashHerder.toml` in the working directory, the per-user file,
/// an explicit `--config` file, then `HASH_HERDER__SECTION__KEY` variables.
pub fn load_configuration(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder =
        Config::builder().add_source(ConfigFile::with_name("HashHerder").required(false));

    if let Some(user_path) = user_config_path() {
        builder = builder.add_source(ConfigFile::from(user_path).required(false));
    }
    if let Some(path) = explicit {
        builder = builder.add_source(ConfigFile::from(path).required(true));
    }

    builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("scanner.ignore_patterns")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize::<AppConfig>()
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// Remove directories that are subdirectories of other directories in the list.
pub fn non_overlapping_directories(dirs: Vec<PathBuf>) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for dir in dirs {
        if result.iter().any(|kept| dir.starts_with(kept)) {
            continue;
        }
        result.retain(|kept| !kept.starts_with(&dir));
        result.push(dir);
    }

    result
}
