//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`{PREFIX}KEY`, nested keys joined with `__`)
//! 2. Config file (TOML, YAML or JSON by extension)
//! 3. Struct defaults

use crate::error::{Error, Result};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Environment prefix used by FireSense tools
pub const ENV_PREFIX: &str = "FIRESENSE_";

/// Load configuration from defaults, an optional file and the environment
pub fn load_config<T>(path: Option<&Path>, env_prefix: &str) -> Result<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()));
    if let Some(path) = path {
        figment = figment.merge(file_provider(path)?);
        info!("Loading configuration from {}", path.display());
    }
    figment = figment.merge(Env::prefixed(env_prefix).split("__"));
    debug!("Environment overrides use prefix {}", env_prefix);

    figment
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration: {}", e)))
}

/// Load configuration from a specific file only
pub fn load_config_from_file<T, P>(path: P) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    Figment::from(file_provider(path)?)
        .extract()
        .map_err(|e| Error::Config(format!("Failed to load configuration from file: {}", e)))
}

fn file_provider(path: &Path) -> Result<Figment> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )));
    }
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| Error::Config("Config file must have an extension".to_string()))?;

    match extension {
        "toml" => Ok(Figment::from(Toml::file(path))),
        "yaml" | "yml" => Ok(Figment::from(Yaml::file(path))),
        "json" => Ok(Figment::from(Json::file(path))),
        _ => Err(Error::Config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Write;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Sample {
        name: String,
        interval_ms: u64,
        nested: Nested,
    }

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Nested {
        level: String,
    }

    impl Default for Sample {
        fn default() -> Self {
            Self {
                name: "default".to_string(),
                interval_ms: 100,
                nested: Nested::default(),
            }
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let config: Sample = load_config(None, "FS_TEST_NONE_").unwrap();
        assert_eq!(config, Sample::default());
    }

    #[test]
    fn test_yaml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "device.yaml", "name: kitchen\nnested:\n  level: debug\n");
        let config: Sample = load_config(Some(&path), "FS_TEST_YAML_").unwrap();
        assert_eq!(config.name, "kitchen");
        assert_eq!(config.interval_ms, 100);
        assert_eq!(config.nested.level, "debug");
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "device.toml", "name = \"kitchen\"\ninterval_ms = 250\n");
        std::env::set_var("FS_TEST_ENV_INTERVAL_MS", "500");
        std::env::set_var("FS_TEST_ENV_NESTED__LEVEL", "warn");
        let config: Sample = load_config(Some(&path), "FS_TEST_ENV_").unwrap();
        std::env::remove_var("FS_TEST_ENV_INTERVAL_MS");
        std::env::remove_var("FS_TEST_ENV_NESTED__LEVEL");

        assert_eq!(config.name, "kitchen");
        assert_eq!(config.interval_ms, 500);
        assert_eq!(config.nested.level, "warn");
    }

    #[test]
    fn test_json_file_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "device.json", r#"{"name": "attic", "interval_ms": 5}"#);
        let config: Sample = load_config_from_file(&path).unwrap();
        assert_eq!(config.name, "attic");
        assert_eq!(config.interval_ms, 5);
    }

    #[test]
    fn test_bad_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(&dir, "device.ini", "name=x");
        assert!(matches!(
            load_config::<Sample>(Some(&path), "FS_TEST_BAD_"),
            Err(Error::Config(_))
        ));
        assert!(load_config::<Sample>(Some(Path::new("/nonexistent/x.yaml")), "FS_TEST_BAD_").is_err());
    }
}
