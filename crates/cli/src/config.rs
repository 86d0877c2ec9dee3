use clap::ValueEnum;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    /// Directory model files are resolved against, relative to the working directory.
    pub models_dir: String,
    pub model_file: String,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pre-solved circuit from a YAML fixture.
    Fixture,
    /// Real engine behind a bridge process.
    Bridge,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EngineConfig {
    pub backend: Backend,
    #[serde(default)]
    pub fixture: Option<PathBuf>,
    #[serde(default)]
    pub bridge_command: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub format: LoggingFormatConfig,
    pub levels: LoggingLevelsConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingFormatConfig {
    pub show_time: bool,
    pub location: LoggingLocationConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLocationConfig {
    pub show_file: bool,
    pub show_line: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingLevelsConfig {
    pub debug: bool,
    pub info: bool,
    pub warning: bool,
    pub error: bool,
    pub critical: bool,
}

/// Load configuration.
///
/// Layers, later wins: built-in defaults, `global_config.yaml`, the local
/// `.global_config.yaml` override (or `explicit` in place of both), then
/// `APP__`-prefixed environment variables such as `APP__ENGINE__BACKEND=bridge`.
pub fn load_config(explicit: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());
    let base_path = Path::new(&manifest_dir);

    let mut builder = Config::builder()
        .set_default("models_dir", dss_adapter::models::DEFAULT_MODELS_DIR)?
        .set_default("model_file", "index.dss")?
        .set_default("engine.backend", "fixture")?
        .set_default("logging.format.show_time", false)?
        .set_default("logging.format.location.show_file", false)?
        .set_default("logging.format.location.show_line", false)?
        .set_default("logging.levels.debug", false)?
        .set_default("logging.levels.info", true)?
        .set_default("logging.levels.warning", true)?
        .set_default("logging.levels.error", true)?
        .set_default("logging.levels.critical", true)?;

    builder = match explicit {
        Some(path) => builder.add_source(File::from(path).required(true)),
        None => builder
            .add_source(File::from(base_path.join("global_config.yaml")).required(false))
            .add_source(File::from(base_path.join(".global_config.yaml")).required(false)),
    };

    builder
        .add_source(
            Environment::with_prefix("APP")
                .separator("__")
                .try_parsing(true)
                .list_separator(" ")
                .with_list_parse_key("engine.bridge_command"),
        )
        .build()?
        .try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    struct EnvGuard(&'static str);
    impl EnvGuard {
        fn new(key: &'static str, val: &str) -> Self {
            env::set_var(key, val);
            Self(key)
        }
    }
    impl Drop for EnvGuard {
        fn drop(&mut self) {
            env::remove_var(self.0);
        }
    }

    #[test]
    #[serial]
    fn test_load_config() {
        let config = load_config(None);
        assert!(config.is_ok(), "Failed to load config: {:?}", config.err());

        let config = config.unwrap();
        assert_eq!(config.models_dir, "DSS");
        assert_eq!(config.model_file, "index.dss");
        assert_eq!(config.engine.backend, Backend::Fixture);
        assert!(config.logging.levels.info);
    }

    #[test]
    #[serial]
    fn test_env_var_override_precedence() {
        let _guard = EnvGuard::new("APP__MODEL_FILE", "feeder13.dss");
        let config = load_config(None).expect("Should load config");
        assert_eq!(config.model_file, "feeder13.dss");
    }

    #[test]
    #[serial]
    fn test_backend_and_bridge_command_from_env() {
        let _g1 = EnvGuard::new("APP__ENGINE__BACKEND", "bridge");
        let _g2 = EnvGuard::new("APP__ENGINE__BRIDGE_COMMAND", "python dss_bridge.py");
        let config = load_config(None).expect("Should load config");
        assert_eq!(config.engine.backend, Backend::Bridge);
        assert_eq!(
            config.engine.bridge_command,
            vec!["python".to_string(), "dss_bridge.py".to_string()]
        );
    }

    #[test]
    #[serial]
    fn test_type_coercion_boolean() {
        {
            let _guard = EnvGuard::new("APP__LOGGING__LEVELS__DEBUG", "true");
            let config = load_config(None).expect("Should load config");
            assert!(config.logging.levels.debug);
        }
        {
            let _guard = EnvGuard::new("APP__LOGGING__LEVELS__DEBUG", "false");
            let config = load_config(None).expect("Should load config");
            assert!(!config.logging.levels.debug);
        }
    }

    #[test]
    #[serial]
    fn test_explicit_file_is_required() {
        let missing = env::temp_dir().join("dssctl_no_such_config.yaml");
        assert!(load_config(Some(&missing)).is_err());
    }

    #[test]
    #[serial]
    fn test_explicit_file_overrides_defaults() {
        let path = env::temp_dir().join("dssctl_test_config.yaml");
        std::fs::write(
            &path,
            "models_dir: models\nengine:\n  backend: bridge\n  bridge_command: [dss-bridge, --quiet]\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).expect("Should load config");
        assert_eq!(config.models_dir, "models");
        assert_eq!(config.engine.bridge_command.len(), 2);
        assert_eq!(config.model_file, "index.dss");

        let _ = std::fs::remove_file(&path);
    }
}
