//! SSL bundle 属性

use std::collections::BTreeMap;

use secrecy::Secret;
use serde::Deserialize;

fn default_true() -> bool {
    true
}

/// `ssl.bundle.pem.<name>` 下的所有 bundle
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SslProperties {
    pub bundle: SslBundleProperties,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SslBundleProperties {
    pub pem: BTreeMap<String, PemSslBundleProperties>,
}

/// PEM 存储位置
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PemStoreProperties {
    /// 证书（链）文件路径
    pub certificate: Option<String>,
    /// 私钥文件路径
    pub private_key: Option<String>,
    pub private_key_password: Option<Secret<String>>,
}

/// TLS 协议选项，未设置时由客户端库决定
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SslOptionsProperties {
    pub ciphers: Option<Vec<String>>,
    pub enabled_protocols: Option<Vec<String>>,
}

/// 单个 PEM bundle
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PemSslBundleProperties {
    pub keystore: PemStoreProperties,
    pub truststore: PemStoreProperties,
    pub options: SslOptionsProperties,
    pub protocol: Option<String>,
    #[serde(default = "default_true")]
    pub verify_hostname: bool,
}

impl Default for PemSslBundleProperties {
    fn default() -> Self {
        Self {
            keystore: PemStoreProperties::default(),
            truststore: PemStoreProperties::default(),
            options: SslOptionsProperties::default(),
            protocol: None,
            verify_hostname: true,
        }
    }
}
