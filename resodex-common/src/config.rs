//! Configuration loading
//!
//! Settings come from a TOML file resolved in priority order:
//! 1. Explicit `--config` path (highest priority)
//! 2. `resodex.toml` in the current directory
//! 3. `resodex.toml` in the platform config directory
//! 4. Compiled defaults (fallback)
//!
//! The file also carries the traversal roots used by batch/unattended
//! dumps, each naming the owning user or group and a start folder.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

const CONFIG_FILE_NAME: &str = "resodex.toml";

fn default_api_url() -> String {
    "https://api.resonite.com".to_string()
}

fn default_asset_url() -> String {
    "https://assets.resonite.com".to_string()
}

fn default_dump_dir() -> PathBuf {
    PathBuf::from("_JSON")
}

fn default_parsed_dir() -> PathBuf {
    PathBuf::from("ParsedJSON")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("DATABASE.db")
}

fn default_token_path() -> PathBuf {
    PathBuf::from("AUTH_TOKEN.json")
}

fn default_token_max_age_days() -> i64 {
    28
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// One traversal root: an owner (user or group ID, case sensitive) and a
/// start folder relative to that owner's inventory.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RootSpec {
    pub owner: String,
    pub path: String,
}

/// resodex configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Base URL of the platform API
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Base URL assets are served from (thumbnail derivation)
    #[serde(default = "default_asset_url")]
    pub asset_url: String,
    /// Directory raw snapshots are written to
    #[serde(default = "default_dump_dir")]
    pub dump_dir: PathBuf,
    /// Directory pruned per-category files are written to
    #[serde(default = "default_parsed_dir")]
    pub parsed_dir: PathBuf,
    /// SQLite catalog path
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// Session token file path
    #[serde(default = "default_token_path")]
    pub token_path: PathBuf,
    /// Token file age after which a re-login is forced
    #[serde(default = "default_token_max_age_days")]
    pub token_max_age_days: i64,
    /// Bounded retries for transient network faults during traversal
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    /// Linear backoff step between retries
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Traversal roots used by `dump` (without --owner/--path) and `run`
    #[serde(default)]
    pub roots: Vec<RootSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            asset_url: default_asset_url(),
            dump_dir: default_dump_dir(),
            parsed_dir: default_parsed_dir(),
            database_path: default_database_path(),
            token_path: default_token_path(),
            token_max_age_days: default_token_max_age_days(),
            retry_attempts: default_retry_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            roots: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration, resolving the file in priority order.
    ///
    /// An explicit path that does not exist is an error; a missing
    /// implicit file falls through to the next tier.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            return Self::from_file(path);
        }

        let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
        if cwd_config.exists() {
            return Self::from_file(&cwd_config);
        }

        if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join("resodex").join(CONFIG_FILE_NAME);
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        tracing::debug!("no config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        tracing::info!("loaded config from {}", path.display());
        Ok(config)
    }
}

/// Normalize a user-supplied start folder into the path shape the API
/// expects: backslash separators under the `Inventory` root.
pub fn inventory_path(folder: &str) -> String {
    let normalized = folder.replace('/', "\\");
    let trimmed = normalized.trim_matches('\\');
    if trimmed.is_empty() {
        "Inventory".to_string()
    } else {
        format!("Inventory\\{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn inventory_path_normalization() {
        assert_eq!(inventory_path("Props/Lights"), "Inventory\\Props\\Lights");
        assert_eq!(inventory_path("Props\\Lights"), "Inventory\\Props\\Lights");
        assert_eq!(inventory_path("/Props/"), "Inventory\\Props");
        assert_eq!(inventory_path(""), "Inventory");
    }

    #[test]
    fn defaults_apply_for_missing_keys() {
        let config: Config = toml::from_str("api_url = \"http://localhost:9900\"").unwrap();
        assert_eq!(config.api_url, "http://localhost:9900");
        assert_eq!(config.dump_dir, PathBuf::from("_JSON"));
        assert_eq!(config.retry_attempts, 3);
        assert!(config.roots.is_empty());
    }

    #[test]
    fn roots_parse_from_toml() {
        let config: Config = toml::from_str(
            r#"
            [[roots]]
            owner = "U-alpha"
            path = "Props"

            [[roots]]
            owner = "G-beta"
            path = "Shared/Worlds"
            "#,
        )
        .unwrap();
        assert_eq!(config.roots.len(), 2);
        assert_eq!(config.roots[1].owner, "G-beta");
    }

    #[test]
    fn explicit_config_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("resodex.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "database_path = \"catalog.db\"").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.database_path, PathBuf::from("catalog.db"));
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/resodex.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
