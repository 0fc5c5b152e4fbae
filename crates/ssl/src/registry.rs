//! SSL bundle 注册表

use std::collections::HashMap;
use std::sync::Arc;

use autoconf_config::SslProperties;
use autoconf_errors::{AppError, AppResult};
use tracing::debug;

use crate::bundle::SslBundle;

/// 按名称解析 SSL bundle
pub trait SslBundles: Send + Sync {
    /// 获取 bundle，名称未注册时返回 `AppError::NotFound`
    fn get_bundle(&self, name: &str) -> AppResult<Arc<SslBundle>>;

    /// 已注册的 bundle 名称
    fn bundle_names(&self) -> Vec<String>;
}

/// 内存中的 bundle 注册表
#[derive(Debug, Default)]
pub struct DefaultSslBundleRegistry {
    bundles: HashMap<String, Arc<SslBundle>>,
}

impl DefaultSslBundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 从 `ssl.bundle.pem.*` 属性创建
    pub fn from_properties(properties: &SslProperties) -> AppResult<Self> {
        let mut registry = Self::new();
        for (name, pem) in &properties.bundle.pem {
            if pem.keystore.private_key.is_some() && pem.keystore.certificate.is_none() {
                return Err(AppError::validation(format!(
                    "SSL bundle '{}' has a private key but no certificate",
                    name
                )));
            }
            registry.register(name.clone(), SslBundle::from_properties(name.clone(), pem))?;
        }
        Ok(registry)
    }

    /// 注册 bundle，同名 bundle 已存在时返回 `IllegalState`
    pub fn register(&mut self, name: impl Into<String>, bundle: SslBundle) -> AppResult<()> {
        let name = name.into();
        if self.bundles.contains_key(&name) {
            return Err(AppError::illegal_state(format!(
                "SSL bundle '{}' is already registered",
                name
            )));
        }
        debug!(bundle = %name, "SSL bundle registered");
        self.bundles.insert(name, Arc::new(bundle));
        Ok(())
    }

    pub fn with_bundle(mut self, name: impl Into<String>, bundle: SslBundle) -> AppResult<Self> {
        self.register(name, bundle)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }
}

impl SslBundles for DefaultSslBundleRegistry {
    fn get_bundle(&self, name: &str) -> AppResult<Arc<SslBundle>> {
        self.bundles
            .get(name)
            .cloned()
            .ok_or_else(|| {
                AppError::not_found(format!("SSL bundle name '{}' cannot be found", name))
            })
    }

    fn bundle_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.bundles.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::SslStoreBundle;
    use autoconf_config::PemSslBundleProperties;

    #[test]
    fn test_register_and_get() {
        let registry = DefaultSslBundleRegistry::new()
            .with_bundle("a", SslBundle::system_default())
            .unwrap()
            .with_bundle("b", SslBundle::new("b", SslStoreBundle::new()))
            .unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.bundle_names(), vec!["a", "b"]);
        assert_eq!(registry.get_bundle("b").unwrap().name(), "b");
    }

    #[test]
    fn test_unknown_bundle() {
        let registry = DefaultSslBundleRegistry::new();
        let err = registry.get_bundle("missing").unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn test_duplicate_registration() {
        let mut registry = DefaultSslBundleRegistry::new();
        registry.register("a", SslBundle::system_default()).unwrap();
        let err = registry.register("a", SslBundle::system_default()).unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_from_properties() {
        let mut properties = SslProperties::default();
        let mut pem = PemSslBundleProperties::default();
        pem.truststore.certificate = Some("/etc/ssl/ca.pem".to_string());
        properties.bundle.pem.insert("kafka".to_string(), pem);

        let registry = DefaultSslBundleRegistry::from_properties(&properties).unwrap();
        assert_eq!(registry.get_bundle("kafka").unwrap().name(), "kafka");
    }

    #[test]
    fn test_from_properties_rejects_key_without_certificate() {
        let mut properties = SslProperties::default();
        let mut pem = PemSslBundleProperties::default();
        pem.keystore.private_key = Some("/etc/ssl/client.key".to_string());
        properties.bundle.pem.insert("bad".to_string(), pem);

        let err = DefaultSslBundleRegistry::from_properties(&properties).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
