//! Producer / Consumer 工厂
//!
//! 工厂持有角色配置，按需创建 rdkafka 客户端

use std::sync::atomic::{AtomicU64, Ordering};

use autoconf_errors::{AppError, AppResult};
use rdkafka::consumer::StreamConsumer;
use rdkafka::producer::FutureProducer;
use tracing::debug;

use crate::properties::ClientProperties;

const TRANSACTIONAL_ID_CONFIG: &str = "transactional.id";

/// Producer 工厂
pub trait ProducerFactory: Send + Sync {
    /// 创建 producer，事务模式下每次分配新的 `transactional.id`
    fn create_producer(&self) -> AppResult<FutureProducer>;

    /// 使用调用方提供的事务 ID 前缀创建 producer
    fn create_transactional_producer(&self, _prefix: &str) -> AppResult<FutureProducer> {
        self.create_producer()
    }

    fn configuration(&self) -> &ClientProperties;

    fn transaction_id_prefix(&self) -> Option<&str>;

    fn transaction_capable(&self) -> bool {
        self.transaction_id_prefix().is_some()
    }
}

/// Consumer 工厂
pub trait ConsumerFactory: Send + Sync {
    /// 创建 consumer，`group_id` 覆盖配置中的 `group.id`
    fn create_consumer(&self, group_id: Option<&str>) -> AppResult<StreamConsumer>;

    fn configuration(&self) -> &ClientProperties;

    /// librdkafka 默认开启自动提交
    fn is_auto_commit(&self) -> bool {
        self.configuration()
            .get("enable.auto.commit")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(true)
    }
}

/// 默认 Producer 工厂
#[derive(Debug)]
pub struct DefaultProducerFactory {
    properties: ClientProperties,
    transaction_id_prefix: Option<String>,
    transaction_counter: AtomicU64,
}

impl DefaultProducerFactory {
    pub fn new(properties: ClientProperties) -> Self {
        Self {
            properties,
            transaction_id_prefix: None,
            transaction_counter: AtomicU64::new(0),
        }
    }

    pub fn set_transaction_id_prefix(&mut self, prefix: impl Into<String>) {
        self.transaction_id_prefix = Some(prefix.into());
    }

    /// 供定制器修改配置
    pub fn properties_mut(&mut self) -> &mut ClientProperties {
        &mut self.properties
    }

    /// 分配下一个事务 ID，非事务模式返回 `None`
    pub fn next_transactional_id(&self) -> Option<String> {
        self.transaction_id_prefix
            .as_deref()
            .map(|prefix| self.transactional_id_with(prefix))
    }

    fn transactional_id_with(&self, prefix: &str) -> String {
        let n = self.transaction_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}{}", prefix, n)
    }

    fn create_with(&self, transactional_id: Option<String>) -> AppResult<FutureProducer> {
        let mut client_config = self.properties.to_client_config()?;

        if let Some(transactional_id) = transactional_id {
            debug!(transactional_id = %transactional_id, "Creating transactional producer");
            client_config.set(TRANSACTIONAL_ID_CONFIG, transactional_id);
        }

        client_config
            .create()
            .map_err(|e| AppError::kafka(format!("Failed to create Kafka producer: {}", e)))
    }
}

impl ProducerFactory for DefaultProducerFactory {
    fn create_producer(&self) -> AppResult<FutureProducer> {
        self.create_with(self.next_transactional_id())
    }

    fn create_transactional_producer(&self, prefix: &str) -> AppResult<FutureProducer> {
        self.create_with(Some(self.transactional_id_with(prefix)))
    }

    fn configuration(&self) -> &ClientProperties {
        &self.properties
    }

    fn transaction_id_prefix(&self) -> Option<&str> {
        self.transaction_id_prefix.as_deref()
    }
}

/// 默认 Consumer 工厂
#[derive(Debug, Clone)]
pub struct DefaultConsumerFactory {
    properties: ClientProperties,
}

impl DefaultConsumerFactory {
    pub fn new(properties: ClientProperties) -> Self {
        Self { properties }
    }

    pub fn properties_mut(&mut self) -> &mut ClientProperties {
        &mut self.properties
    }
}

impl ConsumerFactory for DefaultConsumerFactory {
    fn create_consumer(&self, group_id: Option<&str>) -> AppResult<StreamConsumer> {
        let mut client_config = self.properties.to_client_config()?;

        if let Some(group_id) = group_id {
            client_config.set("group.id", group_id);
        }

        client_config
            .create()
            .map_err(|e| AppError::kafka(format!("Failed to create Kafka consumer: {}", e)))
    }

    fn configuration(&self) -> &ClientProperties {
        &self.properties
    }
}

/// Producer 工厂定制器，在工厂创建后按 `order` 升序执行
pub trait ProducerFactoryCustomizer: Send + Sync {
    fn order(&self) -> i32 {
        0
    }

    fn customize(&self, factory: &mut DefaultProducerFactory);
}

/// Consumer 工厂定制器，在工厂创建后按 `order` 升序执行
pub trait ConsumerFactoryCustomizer: Send + Sync {
    fn order(&self) -> i32 {
        0
    }

    fn customize(&self, factory: &mut DefaultConsumerFactory);
}

/// 按 order 升序排列，同序保持注册顺序
pub(crate) fn sorted_by_order<T>(items: &[T], order: impl Fn(&T) -> i32) -> Vec<&T> {
    let mut sorted: Vec<&T> = items.iter().collect();
    sorted.sort_by_key(|item| order(item));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Recording {
        order: i32,
        label: &'static str,
        seen: Arc<Mutex<Vec<&'static str>>>,
    }

    impl ProducerFactoryCustomizer for Recording {
        fn order(&self) -> i32 {
            self.order
        }

        fn customize(&self, factory: &mut DefaultProducerFactory) {
            self.seen.lock().unwrap().push(self.label);
            factory.properties_mut().set("client.id", self.label);
        }
    }

    #[test]
    fn test_transactional_ids_are_sequential() {
        let mut factory = DefaultProducerFactory::new(ClientProperties::new());
        assert!(!factory.transaction_capable());
        assert_eq!(factory.next_transactional_id(), None);

        factory.set_transaction_id_prefix("tx-");
        assert!(factory.transaction_capable());
        assert_eq!(factory.next_transactional_id().as_deref(), Some("tx-0"));
        assert_eq!(factory.next_transactional_id().as_deref(), Some("tx-1"));
    }

    #[test]
    fn test_customizers_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let customizers: Vec<Arc<dyn ProducerFactoryCustomizer>> = vec![
            Arc::new(Recording {
                order: 10,
                label: "late",
                seen: seen.clone(),
            }),
            Arc::new(Recording {
                order: -5,
                label: "early",
                seen: seen.clone(),
            }),
            Arc::new(Recording {
                order: 10,
                label: "late-second",
                seen: seen.clone(),
            }),
        ];

        let mut factory = DefaultProducerFactory::new(ClientProperties::new());
        for customizer in sorted_by_order(&customizers, |c| c.order()) {
            customizer.customize(&mut factory);
        }

        assert_eq!(*seen.lock().unwrap(), vec!["early", "late", "late-second"]);
        assert_eq!(factory.configuration().get("client.id"), Some("late-second"));
    }

    #[test]
    fn test_consumer_auto_commit_flag() {
        let mut factory = DefaultConsumerFactory::new(ClientProperties::new());
        assert!(factory.is_auto_commit());

        factory.properties_mut().set("enable.auto.commit", "false");
        assert!(!factory.is_auto_commit());
    }

    #[test]
    fn test_create_producer_without_broker() {
        let mut properties = ClientProperties::new();
        properties.set("bootstrap.servers", "localhost:9092");
        let factory = DefaultProducerFactory::new(properties);
        assert!(factory.create_producer().is_ok());
    }
}
