//! JAAS 登录模块
//!
//! 把 JAAS 形式的登录配置映射为 librdkafka 的 SASL 配置项

use std::collections::BTreeMap;
use std::fs::File;
use std::io;

use autoconf_config::{JaasProperties, Redacted};
use tracing::debug;

use crate::properties::ClientProperties;

pub const DEFAULT_LOGIN_MODULE: &str = "com.sun.security.auth.module.Krb5LoginModule";

/// 值为文件路径的选项，创建时校验可读
const FILE_OPTIONS: &[&str] = &["keyTab"];

/// JAAS 控制标志
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlFlag {
    #[default]
    Required,
    Requisite,
    Sufficient,
    Optional,
}

impl ControlFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControlFlag::Required => "required",
            ControlFlag::Requisite => "requisite",
            ControlFlag::Sufficient => "sufficient",
            ControlFlag::Optional => "optional",
        }
    }

    pub fn parse(value: &str) -> io::Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "required" => Ok(ControlFlag::Required),
            "requisite" => Ok(ControlFlag::Requisite),
            "sufficient" => Ok(ControlFlag::Sufficient),
            "optional" => Ok(ControlFlag::Optional),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Unknown JAAS control flag: {}", other),
            )),
        }
    }
}

/// JAAS 登录模块初始化器
#[derive(Clone)]
pub struct KafkaJaasLoginModuleInitializer {
    login_module: String,
    control_flag: ControlFlag,
    options: BTreeMap<String, String>,
}

impl KafkaJaasLoginModuleInitializer {
    /// 从属性创建
    ///
    /// 控制标志无法识别或文件类选项不可读时返回 I/O 错误。
    pub fn new(properties: &JaasProperties) -> io::Result<Self> {
        let mut initializer = Self {
            login_module: DEFAULT_LOGIN_MODULE.to_string(),
            control_flag: ControlFlag::default(),
            options: BTreeMap::new(),
        };
        if let Some(flag) = &properties.control_flag {
            initializer.control_flag = ControlFlag::parse(flag)?;
        }
        if let Some(module) = &properties.login_module {
            initializer.login_module = module.clone();
        }
        initializer.set_options(properties.options.clone())?;
        Ok(initializer)
    }

    pub fn set_options(&mut self, options: BTreeMap<String, String>) -> io::Result<()> {
        for key in FILE_OPTIONS {
            if let Some(path) = options.get(*key) {
                File::open(path)?;
            }
        }
        self.options = options;
        Ok(())
    }

    pub fn login_module(&self) -> &str {
        &self.login_module
    }

    pub fn control_flag(&self) -> ControlFlag {
        self.control_flag
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// 渲染为 `sasl.jaas.config` 格式
    pub fn jaas_config(&self) -> String {
        let mut config = format!("{} {}", self.login_module, self.control_flag.as_str());
        for (key, value) in &self.options {
            config.push_str(&format!(" {}=\"{}\"", key, value));
        }
        config.push(';');
        config
    }

    fn module_simple_name(&self) -> &str {
        self.login_module
            .rsplit('.')
            .next()
            .unwrap_or(&self.login_module)
    }

    /// 写入 SASL 配置项，已显式配置的键保持不变
    pub fn apply(&self, properties: &mut ClientProperties) {
        let option = |key: &str| self.options.get(key).map(String::as_str);

        match self.module_simple_name() {
            "Krb5LoginModule" => {
                properties.set_if_absent("sasl.mechanism", "GSSAPI");
                if let Some(keytab) = option("keyTab") {
                    properties.set_if_absent("sasl.kerberos.keytab", keytab);
                }
                if let Some(principal) = option("principal") {
                    properties.set_if_absent("sasl.kerberos.principal", principal);
                }
                if let Some(service) = option("serviceName") {
                    properties.set_if_absent("sasl.kerberos.service.name", service);
                }
            }
            "PlainLoginModule" | "ScramLoginModule" => {
                let mechanism = if self.module_simple_name() == "PlainLoginModule" {
                    "PLAIN"
                } else {
                    "SCRAM-SHA-512"
                };
                properties.set_if_absent("sasl.mechanism", mechanism);
                if let Some(username) = option("username") {
                    properties.set_if_absent("sasl.username", username);
                }
                if let Some(password) = option("password") {
                    properties.set_if_absent("sasl.password", password);
                }
            }
            "OAuthBearerLoginModule" => {
                properties.set_if_absent("sasl.mechanism", "OAUTHBEARER");
                if !self.options.is_empty() {
                    let config = self
                        .options
                        .iter()
                        .map(|(key, value)| format!("{}={}", key, value))
                        .collect::<Vec<_>>()
                        .join(" ");
                    properties.set_if_absent("sasl.oauthbearer.config", config);
                }
            }
            other => {
                debug!(login_module = other, "No SASL mapping for JAAS login module");
            }
        }
    }
}

impl std::fmt::Debug for KafkaJaasLoginModuleInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaJaasLoginModuleInitializer")
            .field("login_module", &self.login_module)
            .field("control_flag", &self.control_flag)
            .field("options", &Redacted(&self.options))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jaas(module: Option<&str>, options: &[(&str, &str)]) -> JaasProperties {
        JaasProperties {
            enabled: true,
            login_module: module.map(str::to_string),
            control_flag: None,
            options: options
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_defaults() {
        let initializer = KafkaJaasLoginModuleInitializer::new(&jaas(None, &[])).unwrap();
        assert_eq!(initializer.login_module(), DEFAULT_LOGIN_MODULE);
        assert_eq!(initializer.control_flag(), ControlFlag::Required);
        assert_eq!(
            initializer.jaas_config(),
            "com.sun.security.auth.module.Krb5LoginModule required;"
        );
    }

    #[test]
    fn test_missing_keytab_is_io_error() {
        let properties = jaas(None, &[("keyTab", "/nonexistent/autoconf/kafka.keytab")]);
        let err = KafkaJaasLoginModuleInitializer::new(&properties).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_unknown_control_flag() {
        let mut properties = jaas(None, &[]);
        properties.control_flag = Some("mandatory".to_string());
        let err = KafkaJaasLoginModuleInitializer::new(&properties).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn test_kerberos_mapping() {
        let keytab = tempfile::NamedTempFile::new().unwrap();
        let keytab_path = keytab.path().display().to_string();
        let mut properties = jaas(
            None,
            &[
                ("keyTab", keytab_path.as_str()),
                ("principal", "kafka/host@REALM"),
                ("serviceName", "kafka"),
            ],
        );
        properties.control_flag = Some("SUFFICIENT".to_string());

        let initializer = KafkaJaasLoginModuleInitializer::new(&properties).unwrap();
        let mut client = ClientProperties::new();
        initializer.apply(&mut client);

        assert_eq!(initializer.control_flag(), ControlFlag::Sufficient);
        assert_eq!(client.get("sasl.mechanism"), Some("GSSAPI"));
        assert_eq!(client.get("sasl.kerberos.keytab"), Some(keytab_path.as_str()));
        assert_eq!(client.get("sasl.kerberos.principal"), Some("kafka/host@REALM"));
        assert_eq!(client.get("sasl.kerberos.service.name"), Some("kafka"));
    }

    #[test]
    fn test_plain_mapping_keeps_explicit_values() {
        let properties = jaas(
            Some("org.apache.kafka.common.security.plain.PlainLoginModule"),
            &[("username", "alice"), ("password", "secret")],
        );
        let initializer = KafkaJaasLoginModuleInitializer::new(&properties).unwrap();

        let mut client = ClientProperties::new();
        client.set("sasl.username", "explicit");
        initializer.apply(&mut client);

        assert_eq!(client.get("sasl.mechanism"), Some("PLAIN"));
        assert_eq!(client.get("sasl.username"), Some("explicit"));
        assert_eq!(client.get("sasl.password"), Some("secret"));
        assert_eq!(
            initializer.jaas_config(),
            "org.apache.kafka.common.security.plain.PlainLoginModule required password=\"secret\" username=\"alice\";"
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let properties = jaas(
            Some("org.apache.kafka.common.security.scram.ScramLoginModule"),
            &[("username", "alice"), ("password", "secret")],
        );
        let initializer = KafkaJaasLoginModuleInitializer::new(&properties).unwrap();
        let output = format!("{:?}", initializer);
        assert!(output.contains("alice"));
        assert!(!output.contains("secret"));
    }
}
