//! SSL bundle 模型

use std::fs::File;
use std::path::{Path, PathBuf};

use autoconf_config::{PemSslBundleProperties, PemStoreProperties, SslOptionsProperties};
use autoconf_errors::AppResult;
use secrecy::Secret;
use tracing::debug;

/// 默认 TLS 协议
pub const DEFAULT_PROTOCOL: &str = "TLS";

const SYSTEM_DEFAULT_NAME: &str = "system-default";

/// TLS 协议选项
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SslOptions {
    pub ciphers: Option<Vec<String>>,
    pub enabled_protocols: Option<Vec<String>>,
}

impl SslOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ciphers(mut self, ciphers: Vec<String>) -> Self {
        self.ciphers = Some(ciphers);
        self
    }

    pub fn with_enabled_protocols(mut self, protocols: Vec<String>) -> Self {
        self.enabled_protocols = Some(protocols);
        self
    }

    /// 是否显式指定了任何选项
    pub fn is_specified(&self) -> bool {
        self.ciphers.is_some() || self.enabled_protocols.is_some()
    }
}

impl From<&SslOptionsProperties> for SslOptions {
    fn from(properties: &SslOptionsProperties) -> Self {
        Self {
            ciphers: properties.ciphers.clone(),
            enabled_protocols: properties.enabled_protocols.clone(),
        }
    }
}

/// PEM 存储位置
#[derive(Debug, Clone)]
pub struct SslStoreBundle {
    /// CA 证书路径
    pub ca_location: Option<PathBuf>,
    /// 客户端证书路径
    pub certificate_location: Option<PathBuf>,
    /// 客户端私钥路径
    pub key_location: Option<PathBuf>,
    /// 私钥密码
    pub key_password: Option<Secret<String>>,
    /// 是否校验服务器主机名
    pub verify_hostname: bool,
}

impl Default for SslStoreBundle {
    fn default() -> Self {
        Self {
            ca_location: None,
            certificate_location: None,
            key_location: None,
            key_password: None,
            verify_hostname: true,
        }
    }
}

impl SslStoreBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ca(mut self, ca_location: impl Into<PathBuf>) -> Self {
        self.ca_location = Some(ca_location.into());
        self
    }

    pub fn with_client_cert(
        mut self,
        cert_location: impl Into<PathBuf>,
        key_location: impl Into<PathBuf>,
    ) -> Self {
        self.certificate_location = Some(cert_location.into());
        self.key_location = Some(key_location.into());
        self
    }

    pub fn with_key_password(mut self, password: impl Into<String>) -> Self {
        self.key_password = Some(Secret::new(password.into()));
        self
    }

    pub fn without_hostname_verification(mut self) -> Self {
        self.verify_hostname = false;
        self
    }

    fn from_pem(keystore: &PemStoreProperties, truststore: &PemStoreProperties) -> Self {
        Self {
            ca_location: truststore.certificate.as_ref().map(PathBuf::from),
            certificate_location: keystore.certificate.as_ref().map(PathBuf::from),
            key_location: keystore.private_key.as_ref().map(PathBuf::from),
            key_password: keystore.private_key_password.clone(),
            verify_hostname: true,
        }
    }

    fn locations(&self) -> impl Iterator<Item = &Path> {
        [
            self.ca_location.as_deref(),
            self.certificate_location.as_deref(),
            self.key_location.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// bundle 生成的 TLS 材料
///
/// 所有文件在生成时都已确认可读。
#[derive(Debug, Clone)]
pub struct SslContext {
    pub protocol: String,
    pub ca_location: Option<PathBuf>,
    pub certificate_location: Option<PathBuf>,
    pub key_location: Option<PathBuf>,
    pub key_password: Option<Secret<String>>,
    pub verify_hostname: bool,
}

impl SslContext {
    /// 没有任何文件时使用系统信任根
    pub fn uses_system_roots(&self) -> bool {
        self.ca_location.is_none()
    }
}

/// 命名的 TLS 材料集合
#[derive(Debug, Clone)]
pub struct SslBundle {
    name: String,
    stores: SslStoreBundle,
    options: SslOptions,
    protocol: String,
}

impl SslBundle {
    pub fn new(name: impl Into<String>, stores: SslStoreBundle) -> Self {
        Self {
            name: name.into(),
            stores,
            options: SslOptions::default(),
            protocol: DEFAULT_PROTOCOL.to_string(),
        }
    }

    /// 不携带任何材料的 bundle，使用系统信任根
    pub fn system_default() -> Self {
        Self::new(SYSTEM_DEFAULT_NAME, SslStoreBundle::default())
    }

    /// 从 `ssl.bundle.pem.<name>` 属性创建
    pub fn from_properties(name: impl Into<String>, properties: &PemSslBundleProperties) -> Self {
        let mut stores = SslStoreBundle::from_pem(&properties.keystore, &properties.truststore);
        stores.verify_hostname = properties.verify_hostname;
        Self {
            name: name.into(),
            stores,
            options: SslOptions::from(&properties.options),
            protocol: properties
                .protocol
                .clone()
                .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
        }
    }

    pub fn with_options(mut self, options: SslOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = protocol.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stores(&self) -> &SslStoreBundle {
        &self.stores
    }

    pub fn options(&self) -> &SslOptions {
        &self.options
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// 生成 TLS 材料
    ///
    /// 引用的证书或私钥文件不可读时返回 `AppError::Io`。
    pub fn create_ssl_context(&self) -> AppResult<SslContext> {
        for location in self.stores.locations() {
            File::open(location)?;
        }
        debug!(bundle = %self.name, protocol = %self.protocol, "SSL context created");

        Ok(SslContext {
            protocol: self.protocol.clone(),
            ca_location: self.stores.ca_location.clone(),
            certificate_location: self.stores.certificate_location.clone(),
            key_location: self.stores.key_location.clone(),
            key_password: self.stores.key_password.clone(),
            verify_hostname: self.stores.verify_hostname,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoconf_errors::AppError;
    use std::io::Write;

    #[test]
    fn test_options_specified() {
        assert!(!SslOptions::new().is_specified());
        assert!(SslOptions::new()
            .with_ciphers(vec!["TLS_AES_128_GCM_SHA256".to_string()])
            .is_specified());
        assert!(SslOptions::new()
            .with_enabled_protocols(vec!["TLSv1.3".to_string()])
            .is_specified());
    }

    #[test]
    fn test_create_ssl_context_reads_files() {
        let mut ca = tempfile::NamedTempFile::new().unwrap();
        writeln!(ca, "-----BEGIN CERTIFICATE-----").unwrap();

        let bundle = SslBundle::new("client", SslStoreBundle::new().with_ca(ca.path()));
        let context = bundle.create_ssl_context().unwrap();

        assert_eq!(context.ca_location.as_deref(), Some(ca.path()));
        assert_eq!(context.protocol, DEFAULT_PROTOCOL);
        assert!(context.verify_hostname);
        assert!(!context.uses_system_roots());
    }

    #[test]
    fn test_create_ssl_context_missing_file() {
        let bundle = SslBundle::new(
            "broken",
            SslStoreBundle::new().with_ca("/nonexistent/autoconf/ca.pem"),
        );
        let err = bundle.create_ssl_context().unwrap_err();
        assert!(matches!(err, AppError::Io(_)));
    }

    #[test]
    fn test_system_default() {
        let bundle = SslBundle::system_default();
        assert!(!bundle.options().is_specified());
        assert!(bundle.create_ssl_context().unwrap().uses_system_roots());
    }

    #[test]
    fn test_from_properties() {
        let mut properties = PemSslBundleProperties::default();
        properties.truststore.certificate = Some("/etc/ssl/ca.pem".to_string());
        properties.keystore.certificate = Some("/etc/ssl/client.pem".to_string());
        properties.keystore.private_key = Some("/etc/ssl/client.key".to_string());
        properties.options.enabled_protocols = Some(vec!["TLSv1.2".to_string()]);
        properties.protocol = Some("TLSv1.2".to_string());
        properties.verify_hostname = false;

        let bundle = SslBundle::from_properties("mtls", &properties);
        assert_eq!(bundle.name(), "mtls");
        assert_eq!(bundle.protocol(), "TLSv1.2");
        assert!(bundle.options().is_specified());
        assert_eq!(
            bundle.stores().ca_location.as_deref(),
            Some(Path::new("/etc/ssl/ca.pem"))
        );
        assert_eq!(
            bundle.stores().key_location.as_deref(),
            Some(Path::new("/etc/ssl/client.key"))
        );
        assert!(!bundle.stores().verify_hostname);
    }
}
