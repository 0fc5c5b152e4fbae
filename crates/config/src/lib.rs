//! autoconf-config - 配置加载库
//!
//! 定义 Kafka、MongoDB 和 SSL bundle 的属性树。所有可选值都用 `Option`
//! 表示，`None` 表示沿用客户端库自身的默认值。

mod kafka;
mod mongo;
mod redact;
mod ssl;

pub use kafka::*;
pub use mongo::*;
pub use redact::{Redacted, is_sensitive_key};
pub use ssl::*;

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// 日志格式：`text` 或 `json`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub ssl: SslProperties,
    pub kafka: Option<KafkaProperties>,
    pub mongo: Option<MongoProperties>,
}

impl AppConfig {
    /// 从配置文件和环境变量加载配置
    ///
    /// 加载顺序：`default.toml` -> `{APP_ENV}.toml` -> `APP_` 前缀环境变量，
    /// 环境变量以 `__` 分隔层级，例如 `APP_KAFKA__CLIENT_ID`。
    /// 工作目录下的 `.env` 文件会先导入环境变量。
    pub fn load(config_dir: &str) -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| default_app_env());
        Self::figment(config_dir, &env).extract().map_err(ConfigError::from)
    }

    /// 构建配置源，便于调用方追加自己的 provider
    pub fn figment(config_dir: &str, env: &str) -> Figment {
        Figment::new()
            .merge(Toml::file(format!("{}/default.toml", config_dir)))
            .merge(Toml::file(format!("{}/{}.toml", config_dir, env)))
            .merge(Env::prefixed("APP_").split("__"))
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == "development"
    }
}
