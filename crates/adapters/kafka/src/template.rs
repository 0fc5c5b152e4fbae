//! KafkaTemplate
//!
//! 基于共享 producer 工厂的发送入口

use std::sync::Arc;
use std::time::Duration;

use autoconf_errors::{AppError, AppResult};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use serde::Serialize;
use tokio::sync::{Mutex, OnceCell};
use tracing::{Instrument, debug, error, info_span, warn};

use crate::factory::ProducerFactory;

/// 发送结果监听器
pub trait ProducerListener: Send + Sync {
    fn on_success(&self, _topic: &str, _partition: i32, _offset: i64) {}

    fn on_error(&self, _topic: &str, _key: Option<&str>, _error: &str) {}
}

/// 把发送失败写入日志的监听器
#[derive(Debug, Clone)]
pub struct LoggingProducerListener {
    include_contents: bool,
}

impl Default for LoggingProducerListener {
    fn default() -> Self {
        Self {
            include_contents: true,
        }
    }
}

impl LoggingProducerListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// 日志中是否包含 key
    pub fn with_include_contents(mut self, include: bool) -> Self {
        self.include_contents = include;
        self
    }
}

impl ProducerListener for LoggingProducerListener {
    fn on_error(&self, topic: &str, key: Option<&str>, err: &str) {
        if self.include_contents {
            error!(
                topic = topic,
                key = ?key,
                error = err,
                "Exception thrown when sending a message"
            );
        } else {
            error!(topic = topic, error = err, "Exception thrown when sending a message");
        }
    }
}

/// 把值转换为消息体
pub trait RecordMessageConverter: Send + Sync {
    fn to_payload(&self, value: &serde_json::Value) -> AppResult<Vec<u8>>;
}

/// JSON 消息体转换器
#[derive(Debug, Clone, Default)]
pub struct JsonMessageConverter;

impl RecordMessageConverter for JsonMessageConverter {
    fn to_payload(&self, value: &serde_json::Value) -> AppResult<Vec<u8>> {
        serde_json::to_vec(value)
            .map_err(|e| AppError::validation(format!("Failed to serialize message: {}", e)))
    }
}

/// Kafka 发送模板
pub struct KafkaTemplate {
    producer_factory: Arc<dyn ProducerFactory>,
    producer: OnceCell<FutureProducer>,
    transaction_lock: Mutex<()>,
    producer_listener: Arc<dyn ProducerListener>,
    message_converter: Option<Arc<dyn RecordMessageConverter>>,
    default_topic: Option<String>,
    transaction_id_prefix: Option<String>,
    observation_enabled: bool,
    timeout: Duration,
}

impl KafkaTemplate {
    pub fn new(producer_factory: Arc<dyn ProducerFactory>) -> Self {
        Self {
            producer_factory,
            producer: OnceCell::new(),
            transaction_lock: Mutex::new(()),
            producer_listener: Arc::new(LoggingProducerListener::default()),
            message_converter: None,
            default_topic: None,
            transaction_id_prefix: None,
            observation_enabled: false,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn set_producer_listener(&mut self, listener: Arc<dyn ProducerListener>) {
        self.producer_listener = listener;
    }

    pub fn set_message_converter(&mut self, converter: Arc<dyn RecordMessageConverter>) {
        self.message_converter = Some(converter);
    }

    pub fn set_default_topic(&mut self, topic: impl Into<String>) {
        self.default_topic = Some(topic.into());
    }

    /// 覆盖 producer 工厂的事务 ID 前缀
    pub fn set_transaction_id_prefix(&mut self, prefix: impl Into<String>) {
        self.transaction_id_prefix = Some(prefix.into());
    }

    pub fn set_observation_enabled(&mut self, enabled: bool) {
        self.observation_enabled = enabled;
    }

    /// 设置超时时间
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn producer_factory(&self) -> &Arc<dyn ProducerFactory> {
        &self.producer_factory
    }

    pub fn default_topic(&self) -> Option<&str> {
        self.default_topic.as_deref()
    }

    pub fn transaction_id_prefix(&self) -> Option<&str> {
        self.transaction_id_prefix.as_deref()
    }

    pub fn is_observation_enabled(&self) -> bool {
        self.observation_enabled
    }

    pub fn has_message_converter(&self) -> bool {
        self.message_converter.is_some()
    }

    pub fn is_transactional(&self) -> bool {
        self.transaction_id_prefix.is_some() || self.producer_factory.transaction_capable()
    }

    async fn producer(&self) -> AppResult<&FutureProducer> {
        self.producer
            .get_or_try_init(|| async {
                let producer = match &self.transaction_id_prefix {
                    Some(prefix) => self.producer_factory.create_transactional_producer(prefix)?,
                    None => self.producer_factory.create_producer()?,
                };
                if self.is_transactional() {
                    producer.init_transactions(self.timeout).map_err(|e| {
                        AppError::kafka(format!("Failed to initialize transactions: {}", e))
                    })?;
                }
                Ok(producer)
            })
            .await
    }

    /// 发送消息，返回 (partition, offset)
    pub async fn send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> AppResult<(i32, i64)> {
        if self.observation_enabled {
            let span = info_span!("kafka.send", topic = topic);
            self.do_send(topic, key, payload).instrument(span).await
        } else {
            self.do_send(topic, key, payload).await
        }
    }

    /// 发送到默认 topic
    pub async fn send_default(&self, key: Option<&str>, payload: &[u8]) -> AppResult<(i32, i64)> {
        let topic = self
            .default_topic
            .as_deref()
            .ok_or_else(|| AppError::illegal_state("No default topic configured"))?;
        self.send(topic, key, payload).await
    }

    /// 经消息转换器序列化后发送
    pub async fn send_message<T: Serialize + Sync>(
        &self,
        topic: &str,
        key: Option<&str>,
        value: &T,
    ) -> AppResult<(i32, i64)> {
        let payload = self.to_payload(value)?;
        self.send(topic, key, &payload).await
    }

    /// 没有注册转换器时使用 JSON
    pub fn to_payload<T: Serialize>(&self, value: &T) -> AppResult<Vec<u8>> {
        let value = serde_json::to_value(value)
            .map_err(|e| AppError::validation(format!("Failed to serialize message: {}", e)))?;
        match &self.message_converter {
            Some(converter) => converter.to_payload(&value),
            None => JsonMessageConverter.to_payload(&value),
        }
    }

    async fn do_send(
        &self,
        topic: &str,
        key: Option<&str>,
        payload: &[u8],
    ) -> AppResult<(i32, i64)> {
        let producer = self.producer().await?;

        let send = async {
            let mut record: FutureRecord<'_, str, [u8]> = FutureRecord::to(topic).payload(payload);
            if let Some(key) = key {
                record = record.key(key);
            }
            producer
                .send(record, Timeout::After(self.timeout))
                .await
                .map_err(|(e, _)| {
                    AppError::kafka(format!("Failed to send message to {}: {}", topic, e))
                })
        };

        let result = if self.is_transactional() {
            in_transaction(&self.transaction_lock, producer, self.timeout, send).await
        } else {
            send.await
        };

        match result {
            Ok((partition, offset)) => {
                debug!(topic = topic, partition, offset, "Message sent");
                self.producer_listener.on_success(topic, partition, offset);
                Ok((partition, offset))
            }
            Err(e) => {
                self.producer_listener.on_error(topic, key, &e.to_string());
                Err(e)
            }
        }
    }

    /// 刷新所有待发送的消息
    pub fn flush(&self, timeout: Duration) {
        if let Some(producer) = self.producer.get() {
            if let Err(e) = producer.flush(Timeout::After(timeout)) {
                warn!(error = %e, "Failed to flush Kafka producer");
            }
        }
    }
}

/// 事务生命周期操作
trait TransactionalProducer {
    fn begin(&self) -> AppResult<()>;

    fn commit(&self, timeout: Duration) -> AppResult<()>;

    fn abort(&self, timeout: Duration) -> AppResult<()>;
}

impl TransactionalProducer for FutureProducer {
    fn begin(&self) -> AppResult<()> {
        self.begin_transaction()
            .map_err(|e| AppError::kafka(format!("Failed to begin transaction: {}", e)))
    }

    fn commit(&self, timeout: Duration) -> AppResult<()> {
        self.commit_transaction(timeout)
            .map_err(|e| AppError::kafka(format!("Failed to commit transaction: {}", e)))
    }

    fn abort(&self, timeout: Duration) -> AppResult<()> {
        self.abort_transaction(timeout)
            .map_err(|e| AppError::kafka(format!("Failed to abort transaction: {}", e)))
    }
}

/// 在一个事务中执行发送
///
/// 同一 producer 同时只能有一个进行中的事务，`lock` 持有到提交或回滚结束。
async fn in_transaction<P, F, T>(
    lock: &Mutex<()>,
    producer: &P,
    timeout: Duration,
    send: F,
) -> AppResult<T>
where
    P: TransactionalProducer,
    F: Future<Output = AppResult<T>>,
{
    let _guard = lock.lock().await;
    producer.begin()?;

    let result = match send.await {
        Ok(value) => producer.commit(timeout).map(|()| value),
        Err(e) => Err(e),
    };
    result.map_err(|e| abort_after(producer, timeout, e))
}

/// 回滚失败时记录日志，并把两个错误一起返回
fn abort_after<P: TransactionalProducer>(
    producer: &P,
    timeout: Duration,
    cause: AppError,
) -> AppError {
    match producer.abort(timeout) {
        Ok(()) => cause,
        Err(abort) => {
            error!(error = %abort, cause = %cause, "Failed to abort Kafka transaction");
            AppError::kafka(format!("{}; {}", cause, abort))
        }
    }
}

impl std::fmt::Debug for KafkaTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaTemplate")
            .field("default_topic", &self.default_topic)
            .field("transaction_id_prefix", &self.transaction_id_prefix)
            .field("observation_enabled", &self.observation_enabled)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
