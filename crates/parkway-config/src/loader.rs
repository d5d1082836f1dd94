use std::path::{Path, PathBuf};

use parkway_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

const ENV_PREFIX: &str = "PARKWAY_";

/// Reads `AppConfig` from YAML or TOML and layers `PARKWAY_*` environment
/// variables on top.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`; the file must exist.
    pub fn load(path: &Path) -> Result<AppConfig> {
        let mut config = Self::parse_file(path)?;
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        info!("config loaded from {}", path.display());
        Ok(config)
    }

    /// Load `path` if it exists, otherwise start from defaults. Environment
    /// overrides apply in both cases.
    pub fn load_or_default(path: &Path) -> Result<AppConfig> {
        if path.exists() {
            return Self::load(path);
        }

        debug!("no config file at {}, using defaults", path.display());
        let mut config = AppConfig::default();
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<AppConfig> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "yml" | "yaml" => {
                // An empty YAML document deserializes to unit, not a map.
                if contents.trim().is_empty() {
                    return Ok(AppConfig::default());
                }
                serde_yaml::from_str(&contents)
                    .map_err(|e| Error::Config(format!("YAML parse error: {e}")))
            }
            "toml" => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("TOML parse error: {e}"))),
            other => Err(Error::Config(format!(
                "unsupported config extension: {other}"
            ))),
        }
    }

    /// Apply overrides from `lookup`, which is `std::env::var` outside tests.
    pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(host) = var("HOST") {
            config.server.host = host;
        }
        if let Some(port) = var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| Error::Config(format!("invalid {ENV_PREFIX}PORT: {port}")))?;
        }
        if let Some(grace) = var("SHUTDOWN_GRACE_SECS") {
            config.server.shutdown_grace_secs = grace.parse().map_err(|_| {
                Error::Config(format!("invalid {ENV_PREFIX}SHUTDOWN_GRACE_SECS: {grace}"))
            })?;
        }
        if let Some(path) = var("DATABASE_PATH") {
            config.database.path = PathBuf::from(path);
        }
        if let Some(dir) = var("MIGRATIONS_DIR") {
            config.database.migrations_dir = Some(PathBuf::from(dir));
        }
        if let Some(debug) = var("DEBUG") {
            config.debug = parse_bool(&debug)
                .ok_or_else(|| Error::Config(format!("invalid {ENV_PREFIX}DEBUG: {debug}")))?;
        }
        if let Some(level) = var("LOG_LEVEL") {
            config.log.level = level;
        }

        Ok(())
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
