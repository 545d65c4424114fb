//! Configuration loading and resolution
//!
//! Settings are resolved per key with this priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (a `.env` file is loaded first, if present)
//! 3. TOML config file
//! 4. Built-in default (fallback)
//!
//! Required values are only checked when a command actually needs them, so
//! `exmig clean` does not demand a database URL and `exmig load` does not
//! demand platform credentials.

use crate::{Error, LocaleMap, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const ENV_DATABASE_URL: &str = "EXMIG_DATABASE_URL";
pub const ENV_TARGET_API_URL: &str = "EXMIG_TARGET_API_URL";
pub const ENV_TARGET_ACCESS_TOKEN: &str = "EXMIG_TARGET_ACCESS_TOKEN";
pub const ENV_TARGET_SPACE_ID: &str = "EXMIG_TARGET_SPACE_ID";
pub const ENV_TARGET_ENVIRONMENT_ID: &str = "EXMIG_TARGET_ENVIRONMENT_ID";
pub const ENV_IMAGE_SERVER: &str = "EXMIG_IMAGE_SERVER";
pub const ENV_ASSET_CACHE: &str = "EXMIG_ASSET_CACHE";
pub const ENV_ERROR_LOG: &str = "EXMIG_ERROR_LOG";
pub const ENV_JOBS: &str = "EXMIG_JOBS";

const DEFAULT_CONFIG_FILE: &str = "exmig.toml";
const DEFAULT_TARGET_API_URL: &str = "https://api.contentful.com";
const DEFAULT_ENVIRONMENT_ID: &str = "master";
const DEFAULT_ASSET_CACHE: &str = "tmp/assetIds.json";
const DEFAULT_ERROR_LOG: &str = "tmp/errors.log";

/// Bootstrap configuration as read from the TOML file
///
/// Every key is optional; missing keys fall through to defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub source: SourceSection,
    pub target: TargetSection,
    pub images: ImagesSection,
    pub locales: Option<LocaleMap>,
    pub paths: PathsSection,
    pub jobs: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceSection {
    pub database_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetSection {
    pub api_url: Option<String>,
    pub access_token: Option<String>,
    pub space_id: Option<String>,
    pub environment_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ImagesSection {
    pub server_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub asset_cache: Option<PathBuf>,
    pub error_log: Option<PathBuf>,
}

/// Values supplied on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub jobs: Option<usize>,
    pub asset_cache: Option<PathBuf>,
}

/// Fully resolved configuration
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub database_url: Option<String>,
    pub target: TargetConfig,
    pub image_server: Option<String>,
    pub locales: LocaleMap,
    pub asset_cache: PathBuf,
    pub error_log: PathBuf,
    pub jobs: usize,
}

/// Target platform connection settings
#[derive(Debug, Clone)]
pub struct TargetConfig {
    pub api_url: String,
    pub access_token: Option<String>,
    pub space_id: Option<String>,
    pub environment_id: String,
}

/// Load `.env` into the process environment (missing file is fine)
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => debug!("Loaded environment from {}", path.display()),
        Err(_) => debug!("No .env file loaded"),
    }
}

/// Read the TOML config file
///
/// An explicitly named file must exist. Without one, `./exmig.toml` and then
/// `<config dir>/exmig/exmig.toml` are tried; if neither exists the empty
/// configuration is returned.
pub fn load_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            Some(path.to_path_buf())
        }
        None => default_config_path(),
    };

    let Some(path) = path else {
        debug!("No TOML config file found; using defaults");
        return Ok(TomlConfig::default());
    };

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    let config = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    let local = PathBuf::from(DEFAULT_CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|d| d.join("exmig").join(DEFAULT_CONFIG_FILE))
        .filter(|p| p.exists())
}

impl MigrationConfig {
    /// Resolve against the process environment
    pub fn resolve(cli: &CliOverrides, toml: &TomlConfig) -> Result<Self> {
        Self::resolve_with(cli, toml, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup
    pub fn resolve_with<E>(cli: &CliOverrides, toml: &TomlConfig, env: E) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let jobs = match cli.jobs {
            Some(jobs) => jobs,
            None => match env(ENV_JOBS) {
                Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                    Error::Config(format!("{} must be a positive integer, got {:?}", ENV_JOBS, raw))
                })?,
                None => toml.jobs.unwrap_or(1),
            },
        };
        if jobs == 0 {
            return Err(Error::Config("jobs must be at least 1".to_string()));
        }

        Ok(Self {
            database_url: cli
                .database_url
                .clone()
                .or_else(|| env(ENV_DATABASE_URL))
                .or_else(|| toml.source.database_url.clone()),
            target: TargetConfig {
                api_url: env(ENV_TARGET_API_URL)
                    .or_else(|| toml.target.api_url.clone())
                    .unwrap_or_else(|| DEFAULT_TARGET_API_URL.to_string()),
                access_token: env(ENV_TARGET_ACCESS_TOKEN)
                    .or_else(|| toml.target.access_token.clone()),
                space_id: env(ENV_TARGET_SPACE_ID).or_else(|| toml.target.space_id.clone()),
                environment_id: env(ENV_TARGET_ENVIRONMENT_ID)
                    .or_else(|| toml.target.environment_id.clone())
                    .unwrap_or_else(|| DEFAULT_ENVIRONMENT_ID.to_string()),
            },
            image_server: env(ENV_IMAGE_SERVER).or_else(|| toml.images.server_url.clone()),
            locales: toml.locales.clone().unwrap_or_default(),
            asset_cache: cli
                .asset_cache
                .clone()
                .or_else(|| env(ENV_ASSET_CACHE).map(PathBuf::from))
                .or_else(|| toml.paths.asset_cache.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ASSET_CACHE)),
            error_log: env(ENV_ERROR_LOG)
                .map(PathBuf::from)
                .or_else(|| toml.paths.error_log.clone())
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_LOG)),
            jobs,
        })
    }

    /// Source database URL, or a configuration error naming where to set it
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url.as_deref().ok_or_else(|| {
            missing("Source database URL", "--database-url", ENV_DATABASE_URL, "[source] database_url")
        })
    }

    /// Image server base URL used to build asset upload URLs
    pub fn require_image_server(&self) -> Result<&str> {
        self.image_server.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Image server URL not configured. Set {} or [images] server_url",
                ENV_IMAGE_SERVER
            ))
        })
    }
}

impl TargetConfig {
    /// Access token and space id, both required for the live platform
    pub fn require_credentials(&self) -> Result<(&str, &str)> {
        let token = self.access_token.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Target access token not configured. Set {} or [target] access_token",
                ENV_TARGET_ACCESS_TOKEN
            ))
        })?;
        let space = self.space_id.as_deref().ok_or_else(|| {
            Error::Config(format!(
                "Target space id not configured. Set {} or [target] space_id",
                ENV_TARGET_SPACE_ID
            ))
        })?;
        Ok((token, space))
    }
}

fn missing(what: &str, flag: &str, env: &str, toml_key: &str) -> Error {
    Error::Config(format!(
        "{} not configured. Please configure using one of:\n\
         1. Command line: {}\n\
         2. Environment: {}\n\
         3. TOML config: {}",
        what, flag, env, toml_key
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_nothing_configured() {
        let config =
            MigrationConfig::resolve_with(&CliOverrides::default(), &TomlConfig::default(), env_of(&[]))
                .unwrap();
        assert_eq!(config.target.api_url, DEFAULT_TARGET_API_URL);
        assert_eq!(config.target.environment_id, "master");
        assert_eq!(config.asset_cache, PathBuf::from("tmp/assetIds.json"));
        assert_eq!(config.jobs, 1);
        assert_eq!(config.locales, LocaleMap::default());
        assert!(config.require_database_url().is_err());
    }

    #[test]
    fn test_cli_beats_env_beats_toml() {
        let toml: TomlConfig = toml::from_str(
            r#"
            [source]
            database_url = "postgres://toml"
            "#,
        )
        .unwrap();

        let from_toml =
            MigrationConfig::resolve_with(&CliOverrides::default(), &toml, env_of(&[])).unwrap();
        assert_eq!(from_toml.require_database_url().unwrap(), "postgres://toml");

        let from_env = MigrationConfig::resolve_with(
            &CliOverrides::default(),
            &toml,
            env_of(&[(ENV_DATABASE_URL, "postgres://env")]),
        )
        .unwrap();
        assert_eq!(from_env.require_database_url().unwrap(), "postgres://env");

        let cli = CliOverrides {
            database_url: Some("postgres://cli".to_string()),
            ..Default::default()
        };
        let from_cli =
            MigrationConfig::resolve_with(&cli, &toml, env_of(&[(ENV_DATABASE_URL, "postgres://env")]))
                .unwrap();
        assert_eq!(from_cli.require_database_url().unwrap(), "postgres://cli");
    }

    #[test]
    fn test_blank_env_value_is_ignored() {
        let toml: TomlConfig = toml::from_str("[images]\nserver_url = \"https://img/\"").unwrap();
        let config = MigrationConfig::resolve_with(
            &CliOverrides::default(),
            &toml,
            env_of(&[(ENV_IMAGE_SERVER, "   ")]),
        )
        .unwrap();
        assert_eq!(config.require_image_server().unwrap(), "https://img/");
    }

    #[test]
    fn test_invalid_jobs_rejected() {
        let result = MigrationConfig::resolve_with(
            &CliOverrides::default(),
            &TomlConfig::default(),
            env_of(&[(ENV_JOBS, "many")]),
        );
        assert!(matches!(result, Err(Error::Config(_))));

        let zero = CliOverrides {
            jobs: Some(0),
            ..Default::default()
        };
        assert!(MigrationConfig::resolve_with(&zero, &TomlConfig::default(), env_of(&[])).is_err());
    }

    #[test]
    fn test_credentials_required_for_live_target() {
        let config = MigrationConfig::resolve_with(
            &CliOverrides::default(),
            &TomlConfig::default(),
            env_of(&[(ENV_TARGET_ACCESS_TOKEN, "token")]),
        )
        .unwrap();
        let err = config.target.require_credentials().unwrap_err();
        assert!(err.to_string().contains(ENV_TARGET_SPACE_ID));
    }

    #[test]
    fn test_missing_explicit_config_file_is_error() {
        let result = load_toml_config(Some(Path::new("/nonexistent/exmig.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_toml_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exmig.toml");
        std::fs::write(
            &path,
            r#"
            jobs = 3

            [target]
            space_id = "space"
            environment_id = "staging"

            [locales]
            default_target = "en-GB"
            "#,
        )
        .unwrap();

        let toml = load_toml_config(Some(&path)).unwrap();
        assert_eq!(toml.jobs, Some(3));
        assert_eq!(toml.target.environment_id.as_deref(), Some("staging"));
        assert_eq!(
            toml.locales.unwrap().target_for("nl"),
            Some("nl-NL")
        );
    }
}
