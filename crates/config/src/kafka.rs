//! Kafka 属性树
//!
//! 通用属性在顶层，producer / consumer / admin / streams 各自可以覆盖
//! bootstrap servers、client id、安全协议和 SSL bundle。

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::redact::Redacted;

fn default_bootstrap_servers() -> Vec<String> {
    vec!["localhost:9092".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_delay_ms() -> Option<u64> {
    Some(1000)
}

/// SSL 属性，只引用已注册的 bundle 名称
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KafkaSslProperties {
    pub bundle: Option<String>,
}

/// 安全协议属性
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KafkaSecurityProperties {
    /// 例如 `PLAINTEXT`、`SSL`、`SASL_SSL`
    pub protocol: Option<String>,
}

/// Kafka 根属性
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaProperties {
    pub bootstrap_servers: Vec<String>,
    pub client_id: Option<String>,
    /// 直接透传给客户端的额外属性
    pub properties: BTreeMap<String, String>,
    pub ssl: KafkaSslProperties,
    pub security: KafkaSecurityProperties,
    pub producer: ProducerProperties,
    pub consumer: ConsumerProperties,
    pub admin: AdminProperties,
    pub streams: StreamsProperties,
    pub jaas: JaasProperties,
    pub template: TemplateProperties,
    pub retry: RetryProperties,
}

impl Default for KafkaProperties {
    fn default() -> Self {
        Self {
            bootstrap_servers: default_bootstrap_servers(),
            client_id: None,
            properties: BTreeMap::new(),
            ssl: KafkaSslProperties::default(),
            security: KafkaSecurityProperties::default(),
            producer: ProducerProperties::default(),
            consumer: ConsumerProperties::default(),
            admin: AdminProperties::default(),
            streams: StreamsProperties::default(),
            jaas: JaasProperties::default(),
            template: TemplateProperties::default(),
            retry: RetryProperties::default(),
        }
    }
}

impl KafkaProperties {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: vec![bootstrap_servers.into()],
            ..Default::default()
        }
    }
}

/// Producer 属性
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProducerProperties {
    pub bootstrap_servers: Option<Vec<String>>,
    pub client_id: Option<String>,
    pub ssl: KafkaSslProperties,
    pub security: KafkaSecurityProperties,
    /// 确认模式：`0`、`1` 或 `all`
    pub acks: Option<String>,
    pub batch_size: Option<u64>,
    /// 发送队列最大容量（KB）
    pub buffer_memory_kb: Option<u64>,
    pub compression_type: Option<String>,
    pub retries: Option<u32>,
    pub linger_ms: Option<u64>,
    /// 设置后 producer 工厂进入事务模式，并注册事务管理器
    pub transaction_id_prefix: Option<String>,
    pub properties: BTreeMap<String, String>,
}

/// Consumer 属性
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsumerProperties {
    pub bootstrap_servers: Option<Vec<String>>,
    pub client_id: Option<String>,
    pub ssl: KafkaSslProperties,
    pub security: KafkaSecurityProperties,
    pub group_id: Option<String>,
    pub auto_commit_interval_ms: Option<u64>,
    /// `earliest`、`latest` 或 `none`
    pub auto_offset_reset: Option<String>,
    pub enable_auto_commit: Option<bool>,
    pub fetch_max_wait_ms: Option<u64>,
    pub fetch_min_size: Option<u64>,
    pub heartbeat_interval_ms: Option<u64>,
    /// `read_committed` 或 `read_uncommitted`
    pub isolation_level: Option<String>,
    pub max_poll_interval_ms: Option<u64>,
    pub properties: BTreeMap<String, String>,
}

/// Admin 属性
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminProperties {
    pub bootstrap_servers: Option<Vec<String>>,
    pub client_id: Option<String>,
    pub ssl: KafkaSslProperties,
    pub security: KafkaSecurityProperties,
    pub close_timeout_secs: Option<u64>,
    pub operation_timeout_secs: Option<u64>,
    /// broker 不可用时是否让启动失败
    pub fail_fast: bool,
    pub modify_topic_configs: bool,
    #[serde(default = "default_true")]
    pub auto_create: bool,
    pub properties: BTreeMap<String, String>,
}

impl Default for AdminProperties {
    fn default() -> Self {
        Self {
            bootstrap_servers: None,
            client_id: None,
            ssl: KafkaSslProperties::default(),
            security: KafkaSecurityProperties::default(),
            close_timeout_secs: None,
            operation_timeout_secs: None,
            fail_fast: false,
            modify_topic_configs: false,
            auto_create: true,
            properties: BTreeMap::new(),
        }
    }
}

/// Streams 属性（仅用于连接信息的角色覆盖）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StreamsProperties {
    pub bootstrap_servers: Option<Vec<String>>,
    pub client_id: Option<String>,
    pub application_id: Option<String>,
    pub ssl: KafkaSslProperties,
    pub security: KafkaSecurityProperties,
    pub properties: BTreeMap<String, String>,
}

/// JAAS 登录模块属性
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct JaasProperties {
    pub enabled: bool,
    pub login_module: Option<String>,
    /// `required`、`requisite`、`sufficient` 或 `optional`
    pub control_flag: Option<String>,
    /// `password` 等敏感选项不出现在 `Debug` 输出中
    pub options: BTreeMap<String, String>,
}

impl std::fmt::Debug for JaasProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JaasProperties")
            .field("enabled", &self.enabled)
            .field("login_module", &self.login_module)
            .field("control_flag", &self.control_flag)
            .field("options", &Redacted(&self.options))
            .finish()
    }
}

/// KafkaTemplate 属性
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TemplateProperties {
    pub default_topic: Option<String>,
    pub transaction_id_prefix: Option<String>,
    pub observation_enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RetryProperties {
    pub topic: RetryTopicProperties,
}

/// 重试 topic 属性
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryTopicProperties {
    pub enabled: bool,
    /// 总尝试次数（含首次处理），DLT 之前
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,
    pub backoff: BackoffProperties,
}

impl Default for RetryTopicProperties {
    fn default() -> Self {
        Self {
            enabled: false,
            attempts: default_retry_attempts(),
            backoff: BackoffProperties::default(),
        }
    }
}

/// 退避属性
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffProperties {
    #[serde(default = "default_backoff_delay_ms")]
    pub delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub multiplier: Option<f64>,
    /// 是否加随机抖动
    pub random: Option<bool>,
}

impl Default for BackoffProperties {
    fn default() -> Self {
        Self {
            delay_ms: default_backoff_delay_ms(),
            max_delay_ms: None,
            multiplier: None,
            random: None,
        }
    }
}
