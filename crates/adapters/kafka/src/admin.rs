//! Kafka Admin 模块
//!
//! 启动时按声明创建 topic，可选地同步已有 topic 的配置

use std::collections::HashMap;
use std::time::Duration;

use autoconf_errors::{AppError, AppResult};
use rdkafka::admin::{
    AdminClient, AdminOptions, AlterConfig, NewTopic, ResourceSpecifier, TopicReplication,
};
use rdkafka::client::DefaultClientContext;
use rdkafka::error::RDKafkaErrorCode;
use tracing::{debug, info, warn};

use crate::properties::ClientProperties;

const DEFAULT_CLOSE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_OPERATION_TIMEOUT_SECS: u64 = 30;

/// 需要在启动时存在的 topic
#[derive(Debug, Clone)]
pub struct TopicSpec {
    /// Topic 名称
    pub name: String,
    /// 分区数量
    pub num_partitions: i32,
    /// 副本因子
    pub replication_factor: i32,
    /// 额外配置
    pub config: HashMap<String, String>,
}

impl TopicSpec {
    pub fn new(name: impl Into<String>, num_partitions: i32, replication_factor: i32) -> Self {
        Self {
            name: name.into(),
            num_partitions,
            replication_factor,
            config: HashMap::new(),
        }
    }

    /// 添加自定义配置
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }
}

/// Kafka Admin
///
/// 只持有配置，客户端在 `initialize` 时才创建。
#[derive(Debug, Clone)]
pub struct KafkaAdmin {
    properties: ClientProperties,
    close_timeout_secs: u64,
    operation_timeout_secs: u64,
    fatal_if_broker_not_available: bool,
    modify_topic_configs: bool,
    auto_create: bool,
}

impl KafkaAdmin {
    pub fn new(properties: ClientProperties) -> Self {
        Self {
            properties,
            close_timeout_secs: DEFAULT_CLOSE_TIMEOUT_SECS,
            operation_timeout_secs: DEFAULT_OPERATION_TIMEOUT_SECS,
            fatal_if_broker_not_available: false,
            modify_topic_configs: false,
            auto_create: true,
        }
    }

    pub fn set_close_timeout(&mut self, secs: u64) {
        self.close_timeout_secs = secs;
    }

    pub fn set_operation_timeout(&mut self, secs: u64) {
        self.operation_timeout_secs = secs;
    }

    pub fn set_fatal_if_broker_not_available(&mut self, fatal: bool) {
        self.fatal_if_broker_not_available = fatal;
    }

    pub fn set_modify_topic_configs(&mut self, modify: bool) {
        self.modify_topic_configs = modify;
    }

    pub fn set_auto_create(&mut self, auto_create: bool) {
        self.auto_create = auto_create;
    }

    pub fn configuration(&self) -> &ClientProperties {
        &self.properties
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_secs(self.operation_timeout_secs)
    }

    pub fn is_fatal_if_broker_not_available(&self) -> bool {
        self.fatal_if_broker_not_available
    }

    pub fn is_modify_topic_configs(&self) -> bool {
        self.modify_topic_configs
    }

    pub fn is_auto_create(&self) -> bool {
        self.auto_create
    }

    /// 创建 Admin 客户端
    pub fn create_client(&self) -> AppResult<AdminClient<DefaultClientContext>> {
        self.properties
            .to_client_config()?
            .create()
            .map_err(|e| AppError::kafka(format!("Failed to create admin client: {}", e)))
    }

    /// 创建声明的 topic
    ///
    /// 返回是否执行了创建。broker 不可用时只有开启 fail-fast 才返回错误。
    pub async fn initialize(&self, topics: &[TopicSpec]) -> AppResult<bool> {
        if !self.auto_create || topics.is_empty() {
            debug!(auto_create = self.auto_create, "Skipping topic initialization");
            return Ok(false);
        }

        match self.create_topics(topics).await {
            Ok(()) => Ok(true),
            Err(e) if self.fatal_if_broker_not_available => Err(e),
            Err(e) => {
                warn!(error = %e, "Could not configure topics, continuing without them");
                Ok(false)
            }
        }
    }

    async fn create_topics(&self, topics: &[TopicSpec]) -> AppResult<()> {
        let admin = self.create_client()?;
        let result = self.create_with(&admin, topics).await;
        if !close_within(admin, self.close_timeout()).await {
            warn!(
                close_timeout_secs = self.close_timeout_secs,
                "Admin client did not close within timeout"
            );
        }
        result
    }

    async fn create_with(
        &self,
        admin: &AdminClient<DefaultClientContext>,
        topics: &[TopicSpec],
    ) -> AppResult<()> {
        let opts = AdminOptions::new().operation_timeout(Some(self.operation_timeout()));

        let new_topics: Vec<NewTopic<'_>> = topics
            .iter()
            .map(|topic| {
                topic.config.iter().fold(
                    NewTopic::new(
                        &topic.name,
                        topic.num_partitions,
                        TopicReplication::Fixed(topic.replication_factor),
                    ),
                    |new_topic, (key, value)| new_topic.set(key, value),
                )
            })
            .collect();

        let results = admin
            .create_topics(&new_topics, &opts)
            .await
            .map_err(|e| AppError::kafka(format!("Failed to create topics: {}", e)))?;

        let mut existing = Vec::new();
        for result in results {
            match result {
                Ok(name) => {
                    info!(topic = %name, "Topic created successfully");
                }
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %name, "Topic already exists");
                    existing.push(name);
                }
                Err((name, err)) => {
                    return Err(AppError::kafka(format!(
                        "Failed to create topic {}: {:?}",
                        name, err
                    )));
                }
            }
        }

        if self.modify_topic_configs {
            self.alter_existing(admin, topics, &existing, &opts).await?;
        }

        Ok(())
    }

    async fn alter_existing(
        &self,
        admin: &AdminClient<DefaultClientContext>,
        topics: &[TopicSpec],
        existing: &[String],
        opts: &AdminOptions,
    ) -> AppResult<()> {
        let alters: Vec<AlterConfig<'_>> = topics
            .iter()
            .filter(|topic| existing.contains(&topic.name) && !topic.config.is_empty())
            .map(|topic| {
                topic.config.iter().fold(
                    AlterConfig::new(ResourceSpecifier::Topic(&topic.name)),
                    |alter, (key, value)| alter.set(key, value),
                )
            })
            .collect();

        if alters.is_empty() {
            return Ok(());
        }

        let results = admin
            .alter_configs(&alters, opts)
            .await
            .map_err(|e| AppError::kafka(format!("Failed to alter topic configs: {}", e)))?;

        for result in results {
            match result {
                Ok(resource) => info!(resource = ?resource, "Topic config updated"),
                Err((resource, err)) => {
                    return Err(AppError::kafka(format!(
                        "Failed to update config of {:?}: {:?}",
                        resource, err
                    )));
                }
            }
        }

        Ok(())
    }
}

/// 在阻塞线程上释放客户端，超时返回 `false`
///
/// librdkafka 销毁客户端时会等待后台线程退出。
async fn close_within<T: Send + 'static>(client: T, timeout: Duration) -> bool {
    let close = tokio::task::spawn_blocking(move || drop(client));
    tokio::time::timeout(timeout, close).await.is_ok()
}
