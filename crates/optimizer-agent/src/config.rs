//! Agent configuration

use anyhow::{Context, Result};
use optimizer_lib::OptimizerConfig;
use serde::Deserialize;

/// Environment variable naming the optional configuration file
pub const CONFIG_PATH_ENV: &str = "OPTIMIZER_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "optimizer.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Instance name attached to every log record
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for the application, health, metrics and introspection routes
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "optimizer-agent".to_string())
}

fn default_api_port() -> u16 {
    8080
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from the optional file and `AGENT__*` environment
    ///
    /// Nested keys use `__`, e.g. `AGENT__OPTIMIZER__TUNING__EPSILON=0.05`.
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config: AgentConfig = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("AGENT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("failed to read agent configuration")?
            .try_deserialize()
            .context("failed to parse agent configuration")?;

        config
            .optimizer
            .validate()
            .context("invalid optimizer configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_FILE: &str = "/nonexistent/optimizer.toml";

    // Environment is process-global, so every env-driven case lives in one test
    #[test]
    fn test_load_from_environment() {
        let config = AgentConfig::load_from(MISSING_FILE).unwrap();
        assert_eq!(config.api_port, 8080);
        assert!((config.optimizer.tuning.epsilon - 0.1).abs() < f64::EPSILON);

        std::env::set_var("AGENT__API_PORT", "9191");
        std::env::set_var("AGENT__OPTIMIZER__TUNING__EPSILON", "0.05");
        std::env::set_var("AGENT__OPTIMIZER__FEATURES__AUTO_SCALING", "false");
        let config = AgentConfig::load_from(MISSING_FILE).unwrap();
        assert_eq!(config.api_port, 9191);
        assert!((config.optimizer.tuning.epsilon - 0.05).abs() < f64::EPSILON);
        assert!(!config.optimizer.features.auto_scaling);
        assert!(config.optimizer.features.anomaly_detection);

        std::env::set_var("AGENT__OPTIMIZER__TUNING__EPSILON", "2.0");
        let err = AgentConfig::load_from(MISSING_FILE).unwrap_err();
        assert!(format!("{:#}", err).contains("tuning.epsilon"));

        std::env::remove_var("AGENT__API_PORT");
        std::env::remove_var("AGENT__OPTIMIZER__TUNING__EPSILON");
        std::env::remove_var("AGENT__OPTIMIZER__FEATURES__AUTO_SCALING");
    }
}
