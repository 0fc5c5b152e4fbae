//! Kafka 连接信息
//!
//! 把“连到哪里”与调优属性分离，外部提供的连接信息可以整体替换默认值

use std::sync::Arc;

use autoconf_config::{KafkaProperties, KafkaSecurityProperties, KafkaSslProperties};
use autoconf_errors::{AppError, AppResult};
use autoconf_ssl::{SslBundle, SslBundles};

/// 单个客户端角色的连接信息
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    bootstrap_servers: Vec<String>,
    security_protocol: Option<String>,
    ssl_bundle: Option<Arc<SslBundle>>,
}

impl Configuration {
    pub fn new(
        bootstrap_servers: Vec<String>,
        security_protocol: Option<String>,
        ssl_bundle: Option<Arc<SslBundle>>,
    ) -> Self {
        Self {
            bootstrap_servers,
            security_protocol,
            ssl_bundle,
        }
    }

    pub fn of(bootstrap_servers: Vec<String>) -> Self {
        Self::new(bootstrap_servers, None, None)
    }

    pub fn bootstrap_servers(&self) -> &[String] {
        &self.bootstrap_servers
    }

    /// 逗号分隔的 broker 列表
    pub fn bootstrap_servers_string(&self) -> String {
        self.bootstrap_servers.join(",")
    }

    pub fn security_protocol(&self) -> Option<&str> {
        self.security_protocol.as_deref()
    }

    pub fn ssl_bundle(&self) -> Option<Arc<SslBundle>> {
        self.ssl_bundle.clone()
    }
}

/// Kafka 连接信息提供者
///
/// 各角色默认沿用通用的 broker、安全协议和 SSL bundle。
#[cfg_attr(test, mockall::automock)]
pub trait KafkaConnectionDetails: Send + Sync {
    fn bootstrap_servers(&self) -> Vec<String>;

    fn security_protocol(&self) -> Option<String> {
        None
    }

    fn ssl_bundle(&self) -> Option<Arc<SslBundle>> {
        None
    }

    fn consumer(&self) -> Configuration {
        Configuration::new(
            self.bootstrap_servers(),
            self.security_protocol(),
            self.ssl_bundle(),
        )
    }

    fn producer(&self) -> Configuration {
        Configuration::new(
            self.bootstrap_servers(),
            self.security_protocol(),
            self.ssl_bundle(),
        )
    }

    fn admin(&self) -> Configuration {
        Configuration::new(
            self.bootstrap_servers(),
            self.security_protocol(),
            self.ssl_bundle(),
        )
    }

    fn streams(&self) -> Configuration {
        Configuration::new(
            self.bootstrap_servers(),
            self.security_protocol(),
            self.ssl_bundle(),
        )
    }
}

/// 从属性树推导的连接信息
///
/// SSL bundle 在创建时解析，名称无效会立即失败。
#[derive(Debug, Clone)]
pub struct PropertiesKafkaConnectionDetails {
    common: Configuration,
    consumer: Configuration,
    producer: Configuration,
    admin: Configuration,
    streams: Configuration,
}

impl PropertiesKafkaConnectionDetails {
    pub fn new(
        properties: &KafkaProperties,
        ssl_bundles: Option<&dyn SslBundles>,
    ) -> AppResult<Self> {
        let resolver = BundleResolver { ssl_bundles };
        let common = Configuration::new(
            properties.bootstrap_servers.clone(),
            properties.security.protocol.clone(),
            resolver.resolve(&properties.ssl)?,
        );

        let role = |servers: &Option<Vec<String>>,
                    security: &KafkaSecurityProperties,
                    ssl: &KafkaSslProperties|
         -> AppResult<Configuration> {
            let ssl_bundle = match ssl.bundle {
                Some(_) => resolver.resolve(ssl)?,
                None => common.ssl_bundle(),
            };
            Ok(Configuration::new(
                servers
                    .clone()
                    .unwrap_or_else(|| common.bootstrap_servers.clone()),
                security
                    .protocol
                    .clone()
                    .or_else(|| common.security_protocol.clone()),
                ssl_bundle,
            ))
        };

        let consumer = role(
            &properties.consumer.bootstrap_servers,
            &properties.consumer.security,
            &properties.consumer.ssl,
        )?;
        let producer = role(
            &properties.producer.bootstrap_servers,
            &properties.producer.security,
            &properties.producer.ssl,
        )?;
        let admin = role(
            &properties.admin.bootstrap_servers,
            &properties.admin.security,
            &properties.admin.ssl,
        )?;
        let streams = role(
            &properties.streams.bootstrap_servers,
            &properties.streams.security,
            &properties.streams.ssl,
        )?;

        Ok(Self {
            common,
            consumer,
            producer,
            admin,
            streams,
        })
    }
}

struct BundleResolver<'a> {
    ssl_bundles: Option<&'a dyn SslBundles>,
}

impl BundleResolver<'_> {
    fn resolve(&self, ssl: &KafkaSslProperties) -> AppResult<Option<Arc<SslBundle>>> {
        let Some(name) = ssl.bundle.as_deref() else {
            return Ok(None);
        };
        let bundles = self.ssl_bundles.ok_or_else(|| {
            AppError::illegal_state(format!(
                "SSL bundle '{}' is configured but no SSL bundle registry is available",
                name
            ))
        })?;
        bundles.get_bundle(name).map(Some)
    }
}

impl KafkaConnectionDetails for PropertiesKafkaConnectionDetails {
    fn bootstrap_servers(&self) -> Vec<String> {
        self.common.bootstrap_servers.clone()
    }

    fn security_protocol(&self) -> Option<String> {
        self.common.security_protocol.clone()
    }

    fn ssl_bundle(&self) -> Option<Arc<SslBundle>> {
        self.common.ssl_bundle()
    }

    fn consumer(&self) -> Configuration {
        self.consumer.clone()
    }

    fn producer(&self) -> Configuration {
        self.producer.clone()
    }

    fn admin(&self) -> Configuration {
        self.admin.clone()
    }

    fn streams(&self) -> Configuration {
        self.streams.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoconf_ssl::{DefaultSslBundleRegistry, SslStoreBundle};

    fn registry() -> DefaultSslBundleRegistry {
        DefaultSslBundleRegistry::new()
            .with_bundle("common", SslBundle::new("common", SslStoreBundle::new()))
            .unwrap()
            .with_bundle("producer", SslBundle::new("producer", SslStoreBundle::new()))
            .unwrap()
    }

    #[test]
    fn test_roles_fall_back_to_common() {
        let mut properties = KafkaProperties::new("common:9092");
        properties.security.protocol = Some("SSL".to_string());
        properties.ssl.bundle = Some("common".to_string());
        let registry = registry();

        let details = PropertiesKafkaConnectionDetails::new(&properties, Some(&registry)).unwrap();
        let consumer = details.consumer();
        assert_eq!(consumer.bootstrap_servers(), ["common:9092".to_string()]);
        assert_eq!(consumer.security_protocol(), Some("SSL"));
        assert_eq!(consumer.ssl_bundle().unwrap().name(), "common");
    }

    #[test]
    fn test_role_specific_values_win() {
        let mut properties = KafkaProperties::new("common:9092");
        properties.ssl.bundle = Some("common".to_string());
        properties.producer.bootstrap_servers = Some(vec!["producer:9093".to_string()]);
        properties.producer.security.protocol = Some("SASL_SSL".to_string());
        properties.producer.ssl.bundle = Some("producer".to_string());
        let registry = registry();

        let details = PropertiesKafkaConnectionDetails::new(&properties, Some(&registry)).unwrap();
        let producer = details.producer();
        assert_eq!(producer.bootstrap_servers_string(), "producer:9093");
        assert_eq!(producer.security_protocol(), Some("SASL_SSL"));
        assert_eq!(producer.ssl_bundle().unwrap().name(), "producer");
        assert_eq!(details.admin().ssl_bundle().unwrap().name(), "common");
    }

    #[test]
    fn test_no_bundle_configured() {
        let properties = KafkaProperties::new("broker:9092");
        let details = PropertiesKafkaConnectionDetails::new(&properties, None).unwrap();
        assert!(details.ssl_bundle().is_none());
        assert!(details.admin().ssl_bundle().is_none());
        assert!(details.streams().security_protocol().is_none());
    }

    #[test]
    fn test_bundle_without_registry_fails() {
        let mut properties = KafkaProperties::new("broker:9092");
        properties.consumer.ssl.bundle = Some("client".to_string());

        let err = PropertiesKafkaConnectionDetails::new(&properties, None).unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_unknown_bundle_fails() {
        let mut properties = KafkaProperties::new("broker:9092");
        properties.ssl.bundle = Some("missing".to_string());
        let registry = registry();

        let err = PropertiesKafkaConnectionDetails::new(&properties, Some(&registry)).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    struct CommonOnly;

    impl KafkaConnectionDetails for CommonOnly {
        fn bootstrap_servers(&self) -> Vec<String> {
            vec!["common:9092".to_string(), "common:9093".to_string()]
        }

        fn security_protocol(&self) -> Option<String> {
            Some("SASL_PLAINTEXT".to_string())
        }
    }

    #[test]
    fn test_role_methods_fall_back_to_common_values() {
        let details = CommonOnly;
        assert!(details.ssl_bundle().is_none());

        for role in [
            details.producer(),
            details.consumer(),
            details.admin(),
            details.streams(),
        ] {
            assert_eq!(role.bootstrap_servers_string(), "common:9092,common:9093");
            assert_eq!(role.security_protocol(), Some("SASL_PLAINTEXT"));
            assert!(role.ssl_bundle().is_none());
        }
    }
}
