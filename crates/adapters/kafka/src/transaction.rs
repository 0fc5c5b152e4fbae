//! Kafka 事务管理器

use std::sync::Arc;
use std::time::Duration;

use autoconf_errors::{AppError, AppResult, ensure_state};
use rdkafka::producer::{FutureProducer, Producer};
use tracing::debug;

use crate::factory::ProducerFactory;

/// 包装共享 producer 工厂的事务管理器
pub struct KafkaTransactionManager {
    producer_factory: Arc<dyn ProducerFactory>,
    timeout: Duration,
}

impl KafkaTransactionManager {
    /// producer 工厂必须支持事务
    pub fn new(producer_factory: Arc<dyn ProducerFactory>) -> AppResult<Self> {
        ensure_state(
            producer_factory.transaction_capable(),
            "The producer factory must support transactions",
        )?;
        Ok(Self {
            producer_factory,
            timeout: Duration::from_secs(30),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn producer_factory(&self) -> &Arc<dyn ProducerFactory> {
        &self.producer_factory
    }

    /// 开启事务，返回的句柄必须提交或回滚
    pub fn begin(&self) -> AppResult<KafkaTransaction> {
        let producer = self.producer_factory.create_producer()?;
        producer
            .init_transactions(self.timeout)
            .map_err(|e| AppError::kafka(format!("Failed to initialize transactions: {}", e)))?;
        producer
            .begin_transaction()
            .map_err(|e| AppError::kafka(format!("Failed to begin transaction: {}", e)))?;
        debug!("Kafka transaction started");

        Ok(KafkaTransaction {
            producer,
            timeout: self.timeout,
        })
    }
}

impl std::fmt::Debug for KafkaTransactionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTransactionManager")
            .field(
                "transaction_id_prefix",
                &self.producer_factory.transaction_id_prefix(),
            )
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// 进行中的事务
pub struct KafkaTransaction {
    producer: FutureProducer,
    timeout: Duration,
}

impl KafkaTransaction {
    pub fn producer(&self) -> &FutureProducer {
        &self.producer
    }

    pub fn commit(self) -> AppResult<()> {
        self.producer
            .commit_transaction(self.timeout)
            .map_err(|e| AppError::kafka(format!("Failed to commit transaction: {}", e)))
    }

    pub fn rollback(self) -> AppResult<()> {
        self.producer
            .abort_transaction(self.timeout)
            .map_err(|e| AppError::kafka(format!("Failed to abort transaction: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::DefaultProducerFactory;
    use crate::properties::ClientProperties;

    #[test]
    fn test_requires_transactional_factory() {
        let factory = Arc::new(DefaultProducerFactory::new(ClientProperties::new()));
        let err = KafkaTransactionManager::new(factory).unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_wraps_transactional_factory() {
        let mut factory = DefaultProducerFactory::new(ClientProperties::new());
        factory.set_transaction_id_prefix("tx-");
        let factory: Arc<dyn ProducerFactory> = Arc::new(factory);

        let manager = KafkaTransactionManager::new(factory.clone()).unwrap();
        assert!(Arc::ptr_eq(manager.producer_factory(), &factory));
        assert_eq!(manager.producer_factory().transaction_id_prefix(), Some("tx-"));
    }
}
