use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::services::registry::RelocationPolicy;

const ENV_PREFIX: &str = "ORCHESTRATOR_";

/// 配置加载错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid environment override: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub expiry: ExpiryConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub relocation: RelocationPolicy,
}

/// 实例过期配置，未设置 TTL 时实例永不过期
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpiryConfig {
    pub registrant_ttl_secs: Option<u64>,
    pub sweep_interval_secs: u64,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            registrant_ttl_secs: None,
            sweep_interval_secs: 30,
        }
    }
}

impl ExpiryConfig {
    pub fn registrant_ttl(&self) -> Option<Duration> {
        self.registrant_ttl_secs.map(Duration::from_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

// 环境变量覆盖项（envy 只支持扁平结构）
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    relocation: Option<RelocationPolicy>,
    registrant_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

impl Config {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// 默认配置 + `.env` / `ORCHESTRATOR_*` 环境变量
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        config.apply_env()?;
        Ok(config)
    }

    /// 配置文件 + 环境变量覆盖
    pub fn load_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expiry.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "expiry.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.expiry.registrant_ttl_secs == Some(0) {
            return Err(ConfigError::Invalid(
                "expiry.registrant_ttl_secs must be greater than zero when set".to_string(),
            ));
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "Loaded .env file");
        }
        self.apply_overrides(std::env::vars())
    }

    fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_iter(vars)?;

        if let Some(relocation) = overrides.relocation {
            self.registry.relocation = relocation;
        }
        if let Some(ttl) = overrides.registrant_ttl_secs {
            self.expiry.registrant_ttl_secs = Some(ttl);
        }
        if let Some(interval) = overrides.sweep_interval_secs {
            self.expiry.sweep_interval_secs = interval;
        }
        self.validate()
    }
}
