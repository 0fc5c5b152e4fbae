//! 服务运行时

use autoconf_config::AppConfig;
use autoconf_errors::{AppError, AppResult};
use autoconf_telemetry::{LogFormat, init_metrics, try_init_tracing};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::{debug, info};

use crate::infrastructure::{Infrastructure, Overrides};

/// 服务运行时配置
pub struct RuntimeConfig {
    pub config_dir: String,
    /// 是否安装全局 Prometheus recorder
    pub install_metrics: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            config_dir: "config".to_string(),
            install_metrics: true,
        }
    }
}

/// 装配完成的运行时
pub struct Runtime {
    pub infrastructure: Infrastructure,
    pub metrics: Option<PrometheusHandle>,
}

/// 初始化服务运行时
pub fn init_runtime(config: &AppConfig) {
    // 生产环境总是输出 JSON
    let format = if config.is_production() {
        LogFormat::Json
    } else {
        LogFormat::parse(&config.telemetry.log_format)
    };
    if let Err(e) = try_init_tracing(&config.telemetry.log_level, format) {
        debug!(error = %e, "Tracing already initialized");
    }

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        "Runtime initialized"
    );
}

/// 加载配置、初始化日志与指标，然后装配基础设施
pub fn bootstrap(runtime: &RuntimeConfig, overrides: Overrides) -> AppResult<Runtime> {
    let config = AppConfig::load(&runtime.config_dir)
        .map_err(|e| AppError::validation(e.to_string()))?;
    init_runtime(&config);

    let metrics = if runtime.install_metrics {
        let handle = init_metrics()
            .map_err(|e| AppError::internal(format!("Failed to install metrics recorder: {}", e)))?;
        Some(handle)
    } else {
        None
    };

    let infrastructure = Infrastructure::from_config(config, overrides)?;
    Ok(Runtime {
        infrastructure,
        metrics,
    })
}
