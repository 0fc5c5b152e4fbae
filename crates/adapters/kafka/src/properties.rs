//! Kafka 客户端属性
//!
//! 把属性树展开成 librdkafka 配置项，并以类型化字段携带 TLS 来源

use std::collections::BTreeMap;
use std::sync::Arc;

use autoconf_config::{KafkaProperties, Redacted};
use autoconf_errors::AppResult;
use autoconf_ssl::SslBundle;
use rdkafka::config::ClientConfig;
use secrecy::ExposeSecret;
use tracing::{debug, warn};

pub const BOOTSTRAP_SERVERS_CONFIG: &str = "bootstrap.servers";
pub const CLIENT_ID_CONFIG: &str = "client.id";
pub const SECURITY_PROTOCOL_CONFIG: &str = "security.protocol";

/// 旧版双键约定中的引擎工厂键
pub const SSL_ENGINE_FACTORY_CLASS_CONFIG: &str = "ssl.engine.factory.class";
/// 旧版双键约定中引擎工厂的名称
pub const SSL_BUNDLE_ENGINE_FACTORY: &str = "SslBundleSslEngineFactory";
/// 旧版双键约定中 bundle 的键
pub const SSL_BUNDLE_KEY: &str = "SslBundle";

/// TLS 材料的来源
#[derive(Debug, Clone)]
pub enum TlsSource {
    /// 连接时由 bundle 生成 TLS 材料
    Bundle(Arc<SslBundle>),
}

impl TlsSource {
    pub fn bundle(&self) -> &Arc<SslBundle> {
        match self {
            TlsSource::Bundle(bundle) => bundle,
        }
    }
}

/// 单个客户端角色（producer / consumer / admin）的配置
///
/// `Debug` 输出屏蔽密码类配置项。
#[derive(Clone, Default)]
pub struct ClientProperties {
    entries: BTreeMap<String, String>,
    tls: Option<TlsSource>,
}

impl ClientProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// 值存在时才写入
    pub fn set_if_present<T: ToString>(&mut self, key: &str, value: Option<T>) -> &mut Self {
        if let Some(value) = value {
            self.entries.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// 键不存在时才写入，显式配置优先
    pub fn set_if_absent(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        self.entries
            .entry(key.to_string())
            .or_insert_with(|| value.into());
        self
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    pub fn extend<'a>(&mut self, entries: impl IntoIterator<Item = (&'a String, &'a String)>) {
        for (key, value) in entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    pub fn tls_source(&self) -> Option<&TlsSource> {
        self.tls.as_ref()
    }

    pub fn set_tls_source(&mut self, source: TlsSource) {
        self.tls = Some(source);
    }

    /// 以旧版双键约定呈现的配置项
    ///
    /// 有 bundle 时额外包含引擎工厂键和以 bundle 类型名为键的 bundle 名称。
    pub fn legacy_entries(&self) -> BTreeMap<String, String> {
        let mut entries = self.entries.clone();
        if let Some(source) = &self.tls {
            entries.insert(
                SSL_ENGINE_FACTORY_CLASS_CONFIG.to_string(),
                SSL_BUNDLE_ENGINE_FACTORY.to_string(),
            );
            entries.insert(SSL_BUNDLE_KEY.to_string(), source.bundle().name().to_string());
        }
        entries
    }

    /// 转换为 rdkafka ClientConfig
    ///
    /// bundle 的 TLS 材料在此时生成并展开为 `ssl.*` 配置项。
    pub fn to_client_config(&self) -> AppResult<ClientConfig> {
        let mut client_config = ClientConfig::new();

        for (key, value) in &self.entries {
            client_config.set(key, value);
        }

        if let Some(source) = &self.tls {
            let bundle = source.bundle();
            let context = bundle.create_ssl_context()?;

            if let Some(ca) = &context.ca_location {
                client_config.set("ssl.ca.location", ca.display().to_string());
            }
            if let Some(cert) = &context.certificate_location {
                client_config.set("ssl.certificate.location", cert.display().to_string());
            }
            if let Some(key) = &context.key_location {
                client_config.set("ssl.key.location", key.display().to_string());
            }
            if let Some(password) = &context.key_password {
                client_config.set("ssl.key.password", password.expose_secret().as_str());
            }
            if !context.verify_hostname {
                client_config.set("ssl.endpoint.identification.algorithm", "none");
            }
            for setting in apply_ssl_options(&mut client_config, bundle) {
                warn!(
                    bundle = %bundle.name(),
                    setting,
                    "SSL bundle setting is not supported by librdkafka, ignored"
                );
            }
            debug!(bundle = %bundle.name(), "Applied SSL bundle to Kafka client config");
        }

        Ok(client_config)
    }
}

impl std::fmt::Debug for ClientProperties {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientProperties")
            .field("entries", &Redacted(&self.entries))
            .field("tls", &self.tls)
            .finish()
    }
}

/// 写入 bundle 的 SSL 选项，返回 librdkafka 无法表达而被忽略的设置
fn apply_ssl_options(client_config: &mut ClientConfig, bundle: &SslBundle) -> Vec<&'static str> {
    let mut ignored = Vec::new();
    let options = bundle.options();
    if let Some(ciphers) = &options.ciphers {
        client_config.set("ssl.cipher.suites", ciphers.join(":"));
    }
    if options.enabled_protocols.is_some() {
        ignored.push("enabled_protocols");
    }
    if !bundle.protocol().eq_ignore_ascii_case("TLS") {
        ignored.push("protocol");
    }
    ignored
}

/// 写入 bundle 作为 TLS 来源，没有 bundle 时不做任何修改
pub fn apply_ssl_bundle(properties: &mut ClientProperties, ssl_bundle: Option<Arc<SslBundle>>) {
    if let Some(bundle) = ssl_bundle {
        properties.set_tls_source(TlsSource::Bundle(bundle));
    }
}

/// 安全协议非空时写入
pub fn apply_security_protocol(properties: &mut ClientProperties, security_protocol: Option<&str>) {
    if let Some(protocol) = security_protocol.filter(|p| !p.is_empty()) {
        properties.set(SECURITY_PROTOCOL_CONFIG, protocol);
    }
}

fn join_servers(servers: &[String]) -> String {
    servers.join(",")
}

fn build_common_properties(properties: &KafkaProperties) -> ClientProperties {
    let mut client = ClientProperties::new();
    client.set(
        BOOTSTRAP_SERVERS_CONFIG,
        join_servers(&properties.bootstrap_servers),
    );
    client.set_if_present(CLIENT_ID_CONFIG, properties.client_id.as_ref());
    apply_security_protocol(&mut client, properties.security.protocol.as_deref());
    client.extend(&properties.properties);
    client
}

/// 构建 producer 配置项
///
/// 事务 ID 前缀不在其中，它由 producer 工厂持有。
pub fn build_producer_properties(properties: &KafkaProperties) -> ClientProperties {
    let producer = &properties.producer;
    let mut client = build_common_properties(properties);

    client.set_if_present(
        BOOTSTRAP_SERVERS_CONFIG,
        producer.bootstrap_servers.as_deref().map(join_servers),
    );
    client.set_if_present(CLIENT_ID_CONFIG, producer.client_id.as_ref());
    apply_security_protocol(&mut client, producer.security.protocol.as_deref());
    client.set_if_present("acks", producer.acks.as_ref());
    client.set_if_present("batch.size", producer.batch_size);
    client.set_if_present("queue.buffering.max.kbytes", producer.buffer_memory_kb);
    client.set_if_present("compression.type", producer.compression_type.as_ref());
    client.set_if_present("retries", producer.retries);
    client.set_if_present("linger.ms", producer.linger_ms);
    client.extend(&producer.properties);
    client
}

/// 构建 consumer 配置项
pub fn build_consumer_properties(properties: &KafkaProperties) -> ClientProperties {
    let consumer = &properties.consumer;
    let mut client = build_common_properties(properties);

    client.set_if_present(
        BOOTSTRAP_SERVERS_CONFIG,
        consumer.bootstrap_servers.as_deref().map(join_servers),
    );
    client.set_if_present(CLIENT_ID_CONFIG, consumer.client_id.as_ref());
    apply_security_protocol(&mut client, consumer.security.protocol.as_deref());
    client.set_if_present("group.id", consumer.group_id.as_ref());
    client.set_if_present("auto.commit.interval.ms", consumer.auto_commit_interval_ms);
    client.set_if_present("auto.offset.reset", consumer.auto_offset_reset.as_ref());
    client.set_if_present("enable.auto.commit", consumer.enable_auto_commit);
    client.set_if_present("fetch.wait.max.ms", consumer.fetch_max_wait_ms);
    client.set_if_present("fetch.min.bytes", consumer.fetch_min_size);
    client.set_if_present("heartbeat.interval.ms", consumer.heartbeat_interval_ms);
    client.set_if_present("isolation.level", consumer.isolation_level.as_ref());
    client.set_if_present("max.poll.interval.ms", consumer.max_poll_interval_ms);
    client.extend(&consumer.properties);
    client
}

/// 构建 admin 配置项
///
/// 超时和开关由 `KafkaAdmin` 持有，不进入客户端配置。
pub fn build_admin_properties(properties: &KafkaProperties) -> ClientProperties {
    let admin = &properties.admin;
    let mut client = build_common_properties(properties);

    client.set_if_present(
        BOOTSTRAP_SERVERS_CONFIG,
        admin.bootstrap_servers.as_deref().map(join_servers),
    );
    client.set_if_present(CLIENT_ID_CONFIG, admin.client_id.as_ref());
    apply_security_protocol(&mut client, admin.security.protocol.as_deref());
    client.extend(&admin.properties);
    client
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoconf_ssl::{SslOptions, SslStoreBundle};

    #[test]
    fn test_producer_properties() {
        let mut properties = KafkaProperties::new("broker:9092");
        properties.client_id = Some("svc".to_string());
        properties.producer.acks = Some("all".to_string());
        properties.producer.compression_type = Some("lz4".to_string());
        properties.producer.client_id = Some("svc-producer".to_string());
        properties.producer.transaction_id_prefix = Some("tx-".to_string());
        properties
            .producer
            .properties
            .insert("enable.idempotence".to_string(), "true".to_string());

        let client = build_producer_properties(&properties);
        assert_eq!(client.get(BOOTSTRAP_SERVERS_CONFIG), Some("broker:9092"));
        assert_eq!(client.get(CLIENT_ID_CONFIG), Some("svc-producer"));
        assert_eq!(client.get("acks"), Some("all"));
        assert_eq!(client.get("compression.type"), Some("lz4"));
        assert_eq!(client.get("enable.idempotence"), Some("true"));
        assert!(!client.contains_key("batch.size"));
        assert!(!client.contains_key("transactional.id"));
        assert!(!client.contains_key(SECURITY_PROTOCOL_CONFIG));
    }

    #[test]
    fn test_debug_masks_passwords() {
        let mut client = ClientProperties::new();
        client
            .set("sasl.username", "alice")
            .set("sasl.password", "hunter2")
            .set("ssl.key.password", "changeit");

        let output = format!("{:?}", client);
        assert!(output.contains("alice"));
        assert!(!output.contains("hunter2"));
        assert!(!output.contains("changeit"));
        assert_eq!(client.get("sasl.password"), Some("hunter2"));
    }

    #[test]
    fn test_consumer_properties_only_present_values() {
        let mut properties = KafkaProperties::new("broker:9092");
        properties.consumer.group_id = Some("orders".to_string());
        properties.consumer.enable_auto_commit = Some(false);

        let client = build_consumer_properties(&properties);
        assert_eq!(client.get("group.id"), Some("orders"));
        assert_eq!(client.get("enable.auto.commit"), Some("false"));
        assert!(!client.contains_key("auto.offset.reset"));
        assert!(!client.contains_key("isolation.level"));
    }

    #[test]
    fn test_role_overrides_common() {
        let mut properties = KafkaProperties::new("common:9092");
        properties.security.protocol = Some("SSL".to_string());
        properties.admin.bootstrap_servers = Some(vec!["a:1".to_string(), "b:2".to_string()]);
        properties.admin.security.protocol = Some("SASL_SSL".to_string());

        let admin = build_admin_properties(&properties);
        assert_eq!(admin.get(BOOTSTRAP_SERVERS_CONFIG), Some("a:1,b:2"));
        assert_eq!(admin.get(SECURITY_PROTOCOL_CONFIG), Some("SASL_SSL"));

        let consumer = build_consumer_properties(&properties);
        assert_eq!(consumer.get(SECURITY_PROTOCOL_CONFIG), Some("SSL"));
    }

    #[test]
    fn test_apply_security_protocol_ignores_empty() {
        let mut client = ClientProperties::new();
        apply_security_protocol(&mut client, Some(""));
        apply_security_protocol(&mut client, None);
        assert!(!client.contains_key(SECURITY_PROTOCOL_CONFIG));

        apply_security_protocol(&mut client, Some("SASL_SSL"));
        assert_eq!(client.get(SECURITY_PROTOCOL_CONFIG), Some("SASL_SSL"));
    }

    #[test]
    fn test_apply_ssl_bundle_legacy_view() {
        let mut client = ClientProperties::new();
        apply_ssl_bundle(&mut client, None);
        assert!(client.tls_source().is_none());
        let legacy = client.legacy_entries();
        assert!(!legacy.contains_key(SSL_ENGINE_FACTORY_CLASS_CONFIG));
        assert!(!legacy.contains_key(SSL_BUNDLE_KEY));

        let bundle = Arc::new(SslBundle::new("kafka", SslStoreBundle::new()));
        apply_ssl_bundle(&mut client, Some(bundle));
        let legacy = client.legacy_entries();
        assert_eq!(
            legacy.get(SSL_ENGINE_FACTORY_CLASS_CONFIG).map(String::as_str),
            Some(SSL_BUNDLE_ENGINE_FACTORY)
        );
        assert_eq!(legacy.get(SSL_BUNDLE_KEY).map(String::as_str), Some("kafka"));
        assert!(!client.contains_key(SSL_BUNDLE_KEY));
    }

    #[test]
    fn test_to_client_config_expands_bundle() {
        let ca = tempfile::NamedTempFile::new().unwrap();
        let bundle = SslBundle::new(
            "kafka",
            SslStoreBundle::new()
                .with_ca(ca.path())
                .without_hostname_verification(),
        );

        let mut client = ClientProperties::new();
        client.set(BOOTSTRAP_SERVERS_CONFIG, "broker:9093");
        apply_ssl_bundle(&mut client, Some(Arc::new(bundle)));

        let config = client.to_client_config().unwrap();
        assert_eq!(config.get(BOOTSTRAP_SERVERS_CONFIG), Some("broker:9093"));
        assert_eq!(
            config.get("ssl.ca.location"),
            Some(ca.path().display().to_string().as_str())
        );
        assert_eq!(config.get("ssl.endpoint.identification.algorithm"), Some("none"));
        assert_eq!(config.get(SSL_ENGINE_FACTORY_CLASS_CONFIG), None);
    }

    #[test]
    fn test_unsupported_ssl_options_reported() {
        let bundle = SslBundle::new("kafka", SslStoreBundle::new())
            .with_options(
                SslOptions::new()
                    .with_ciphers(vec!["ECDHE-RSA-AES256-GCM-SHA384".to_string()])
                    .with_enabled_protocols(vec!["TLSv1.3".to_string()]),
            )
            .with_protocol("TLSv1.2");

        let mut config = ClientConfig::new();
        let ignored = apply_ssl_options(&mut config, &bundle);
        assert_eq!(ignored, vec!["enabled_protocols", "protocol"]);
        assert_eq!(config.get("ssl.cipher.suites"), Some("ECDHE-RSA-AES256-GCM-SHA384"));

        let mut config = ClientConfig::new();
        let plain = SslBundle::new("kafka", SslStoreBundle::new());
        assert!(apply_ssl_options(&mut config, &plain).is_empty());
        assert_eq!(config.get("ssl.cipher.suites"), None);
    }
}
