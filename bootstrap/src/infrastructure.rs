//! 基础设施资源管理
//!
//! 按固定顺序装配：SSL bundle 注册表 -> Kafka 组件 -> MongoDB 客户端设置

use std::sync::Arc;

use autoconf_adapter_kafka::{KafkaAutoConfiguration, KafkaComponents, KafkaOverrides, StepOutcome};
use autoconf_adapter_mongo::{
    MongoClientFactory, MongoClientSettings, MongoClientSettingsBuilderCustomizer,
    MongoConnectionDetails, PropertiesMongoConnectionDetails,
    StandardMongoClientSettingsBuilderCustomizer,
};
use autoconf_config::{AppConfig, MongoProperties};
use autoconf_errors::AppResult;
use autoconf_ssl::{DefaultSslBundleRegistry, SslBundles};
use mongodb::Client;
use tracing::info;

use crate::metrics::{record_component, record_report};

/// 调用方提供的组件，提供后对应的默认组件不再创建
#[derive(Clone, Default)]
pub struct Overrides {
    pub ssl_bundles: Option<Arc<dyn SslBundles>>,
    pub kafka: KafkaOverrides,
    pub mongo_connection_details: Option<Arc<dyn MongoConnectionDetails>>,
    /// 与标准定制器一起按 order 执行
    pub mongo_customizers: Vec<Arc<dyn MongoClientSettingsBuilderCustomizer>>,
}

/// MongoDB 装配结果
#[derive(Debug, Clone)]
pub struct MongoInfrastructure {
    factory: MongoClientFactory,
    settings: MongoClientSettings,
}

impl MongoInfrastructure {
    pub fn factory(&self) -> &MongoClientFactory {
        &self.factory
    }

    pub fn settings(&self) -> &MongoClientSettings {
        &self.settings
    }
}

/// 基础设施资源容器
pub struct Infrastructure {
    /// 应用配置
    config: AppConfig,
    ssl_bundles: Arc<dyn SslBundles>,
    /// Kafka 组件（可选）
    kafka: Option<KafkaComponents>,
    /// MongoDB 客户端设置（可选）
    mongo: Option<MongoInfrastructure>,
}

impl Infrastructure {
    /// 从配置创建基础设施资源
    ///
    /// 任一步骤失败都会立即返回，不会留下部分装配的结果。
    pub fn from_config(config: AppConfig, overrides: Overrides) -> AppResult<Self> {
        // 1. SSL bundle 注册表
        let ssl_bundles: Arc<dyn SslBundles> = match overrides.ssl_bundles {
            Some(bundles) => {
                record_component("ssl_bundles", StepOutcome::Skipped);
                bundles
            }
            None => {
                let registry = DefaultSslBundleRegistry::from_properties(&config.ssl)?;
                info!(bundles = registry.len(), "SSL bundle registry created");
                record_component("ssl_bundles", StepOutcome::Created);
                Arc::new(registry)
            }
        };

        // 2. Kafka（可选）
        let kafka = match &config.kafka {
            Some(properties) => {
                let components = KafkaAutoConfiguration::new(properties.clone())
                    .with_ssl_bundles(ssl_bundles.clone())
                    .configure(overrides.kafka)?;
                record_report(&components.report);
                info!(
                    servers = %components.connection_details.bootstrap_servers().join(","),
                    transactional = components.transaction_manager.is_some(),
                    "Kafka components configured"
                );
                Some(components)
            }
            None => {
                info!("Kafka not configured, skipping");
                None
            }
        };

        // 3. MongoDB（可选）
        let mongo = match &config.mongo {
            Some(properties) => Some(configure_mongo(
                properties,
                ssl_bundles.as_ref(),
                overrides.mongo_connection_details,
                overrides.mongo_customizers,
            )?),
            None => {
                info!("MongoDB not configured, skipping");
                None
            }
        };

        Ok(Self {
            config,
            ssl_bundles,
            kafka,
            mongo,
        })
    }

    /// 获取应用配置
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn ssl_bundles(&self) -> &Arc<dyn SslBundles> {
        &self.ssl_bundles
    }

    pub fn kafka(&self) -> Option<&KafkaComponents> {
        self.kafka.as_ref()
    }

    pub fn mongo(&self) -> Option<&MongoInfrastructure> {
        self.mongo.as_ref()
    }

    /// 创建 MongoDB 客户端，未配置时返回 `None`
    pub async fn mongo_client(&self) -> AppResult<Option<Client>> {
        match &self.mongo {
            Some(mongo) => mongo.factory.create_client().await.map(Some),
            None => Ok(None),
        }
    }
}

fn configure_mongo(
    properties: &MongoProperties,
    ssl_bundles: &dyn SslBundles,
    connection_details: Option<Arc<dyn MongoConnectionDetails>>,
    customizers: Vec<Arc<dyn MongoClientSettingsBuilderCustomizer>>,
) -> AppResult<MongoInfrastructure> {
    let connection_details = match connection_details {
        Some(details) => {
            record_component("mongo_connection_details", StepOutcome::Skipped);
            details
        }
        None => {
            let details = PropertiesMongoConnectionDetails::new(properties, Some(ssl_bundles))?;
            record_component("mongo_connection_details", StepOutcome::Created);
            Arc::new(details)
        }
    };

    let standard: Arc<dyn MongoClientSettingsBuilderCustomizer> = Arc::new(
        StandardMongoClientSettingsBuilderCustomizer::new(
            connection_details,
            properties.uuid_representation,
        ),
    );
    let factory = customizers
        .into_iter()
        .fold(MongoClientFactory::new(vec![standard]), |factory, customizer| {
            factory.with_customizer(customizer)
        });

    let settings = factory.create_settings()?;
    record_component("mongo_client_settings", StepOutcome::Created);
    info!(
        hosts = ?settings.connection_string().map(|cs| cs.hosts().to_vec()),
        ssl = settings.ssl().is_enabled(),
        "MongoDB client settings configured"
    );

    Ok(MongoInfrastructure { factory, settings })
}
