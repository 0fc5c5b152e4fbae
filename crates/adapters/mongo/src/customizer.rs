//! MongoDB 设置定制器

use std::sync::Arc;

use autoconf_config::{MongoSslProperties, UuidRepresentation};
use autoconf_errors::{AppError, AppResult, ensure_state};
use autoconf_ssl::{SslBundle, SslBundles};
use tracing::debug;

use crate::connection::{ConnectionString, MongoConnectionDetails};
use crate::settings::{MongoClientSettingsBuilder, SslSettingsBuilder};

/// 客户端设置定制器，按 `order` 升序执行
pub trait MongoClientSettingsBuilderCustomizer: Send + Sync {
    fn order(&self) -> i32 {
        0
    }

    fn customize(&self, builder: &mut MongoClientSettingsBuilder) -> AppResult<()>;
}

/// 连接来源
#[derive(Clone)]
pub enum ConnectionSource {
    /// 直接给出连接串和 SSL 属性
    Legacy {
        connection_string: ConnectionString,
        ssl: MongoSslProperties,
        ssl_bundles: Option<Arc<dyn SslBundles>>,
    },
    /// 由连接信息提供者决定连接串和 SSL bundle
    Details(Arc<dyn MongoConnectionDetails>),
}

impl std::fmt::Debug for ConnectionSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionSource::Legacy {
                connection_string,
                ssl,
                ..
            } => f
                .debug_struct("Legacy")
                .field("connection_string", connection_string)
                .field("ssl", ssl)
                .finish_non_exhaustive(),
            ConnectionSource::Details(_) => f.write_str("Details"),
        }
    }
}

/// 应用连接串、UUID 编码和 SSL 的标准定制器
#[derive(Debug, Clone)]
pub struct StandardMongoClientSettingsBuilderCustomizer {
    source: ConnectionSource,
    uuid_representation: UuidRepresentation,
    order: i32,
}

impl StandardMongoClientSettingsBuilderCustomizer {
    pub fn new(
        connection_details: Arc<dyn MongoConnectionDetails>,
        uuid_representation: UuidRepresentation,
    ) -> Self {
        Self {
            source: ConnectionSource::Details(connection_details),
            uuid_representation,
            order: 0,
        }
    }

    pub fn legacy(
        connection_string: ConnectionString,
        uuid_representation: UuidRepresentation,
        ssl: MongoSslProperties,
        ssl_bundles: Option<Arc<dyn SslBundles>>,
    ) -> Self {
        Self {
            source: ConnectionSource::Legacy {
                connection_string,
                ssl,
                ssl_bundles,
            },
            uuid_representation,
            order: 0,
        }
    }

    pub fn set_order(&mut self, order: i32) {
        self.order = order;
    }

    pub fn source(&self) -> &ConnectionSource {
        &self.source
    }

    pub fn uuid_representation(&self) -> UuidRepresentation {
        self.uuid_representation
    }
}

impl MongoClientSettingsBuilderCustomizer for StandardMongoClientSettingsBuilderCustomizer {
    fn order(&self) -> i32 {
        self.order
    }

    fn customize(&self, builder: &mut MongoClientSettingsBuilder) -> AppResult<()> {
        builder.uuid_representation(self.uuid_representation);

        match &self.source {
            ConnectionSource::Details(details) => {
                builder.apply_connection_string(details.connection_string());
                // 没有 bundle 时不触碰 SSL 设置
                if let Some(bundle) = details.ssl_bundle() {
                    builder.apply_to_ssl_settings(|ssl| configure_ssl(ssl, &bundle))?;
                }
            }
            ConnectionSource::Legacy {
                connection_string,
                ssl,
                ssl_bundles,
            } => {
                builder.apply_connection_string(connection_string.clone());
                if ssl.enabled {
                    let bundle = resolve_legacy_bundle(ssl, ssl_bundles.as_deref())?;
                    builder.apply_to_ssl_settings(|settings| configure_ssl(settings, &bundle))?;
                }
            }
        }
        Ok(())
    }
}

fn resolve_legacy_bundle(
    ssl: &MongoSslProperties,
    ssl_bundles: Option<&dyn SslBundles>,
) -> AppResult<Arc<SslBundle>> {
    let name = ssl
        .bundle
        .as_deref()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| {
            AppError::illegal_state("SSL is enabled for MongoDB but no SSL bundle is configured")
        })?;
    let bundles = ssl_bundles.ok_or_else(|| {
        AppError::illegal_state(format!(
            "SSL bundle '{}' is configured but no SSL bundle registry is available",
            name
        ))
    })?;
    bundles.get_bundle(name)
}

fn configure_ssl(settings: &mut SslSettingsBuilder, bundle: &SslBundle) -> AppResult<()> {
    ensure_state(
        !bundle.options().is_specified(),
        "SSL options cannot be specified with MongoDB",
    )?;
    settings.enabled(true).context(bundle.create_ssl_context()?);
    debug!(bundle = %bundle.name(), "Applied SSL bundle to MongoDB settings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::MockMongoConnectionDetails;
    use autoconf_ssl::{SslOptions, SslStoreBundle};
    use mockall::mock;

    mock! {
        Bundles {}
        impl SslBundles for Bundles {
            fn get_bundle(&self, name: &str) -> AppResult<Arc<SslBundle>>;
            fn bundle_names(&self) -> Vec<String>;
        }
    }

    fn connection_string() -> ConnectionString {
        ConnectionString::parse("mongodb://localhost:27017/test").unwrap()
    }

    fn details(bundle: Option<SslBundle>) -> Arc<dyn MongoConnectionDetails> {
        let bundle = bundle.map(Arc::new);
        let mut mock = MockMongoConnectionDetails::new();
        mock.expect_connection_string().returning(connection_string);
        mock.expect_ssl_bundle().returning(move || bundle.clone());
        Arc::new(mock)
    }

    fn specified_options() -> SslOptions {
        SslOptions::new().with_ciphers(vec!["TLS_AES_256_GCM_SHA384".to_string()])
    }

    #[test]
    fn test_details_without_bundle_leaves_ssl_untouched() {
        let customizer = StandardMongoClientSettingsBuilderCustomizer::new(
            details(None),
            UuidRepresentation::Standard,
        );
        let mut builder = MongoClientSettingsBuilder::new();
        customizer.customize(&mut builder).unwrap();

        let settings = builder.build();
        assert_eq!(settings.ssl().enabled(), None);
        assert_eq!(settings.uuid_representation(), Some(UuidRepresentation::Standard));
        assert_eq!(
            settings.connection_string().unwrap().as_str(),
            "mongodb://localhost:27017/test"
        );
    }

    #[test]
    fn test_details_with_bundle_enables_ssl() {
        let customizer = StandardMongoClientSettingsBuilderCustomizer::new(
            details(Some(SslBundle::system_default())),
            UuidRepresentation::JavaLegacy,
        );
        let mut builder = MongoClientSettingsBuilder::new();
        customizer.customize(&mut builder).unwrap();

        let settings = builder.build();
        assert_eq!(settings.ssl().enabled(), Some(true));
        assert!(settings.ssl().context().unwrap().uses_system_roots());
    }

    #[test]
    fn test_details_bundle_with_options_fails() {
        let bundle =
            SslBundle::new("mongo", SslStoreBundle::new()).with_options(specified_options());
        let customizer = StandardMongoClientSettingsBuilderCustomizer::new(
            details(Some(bundle)),
            UuidRepresentation::JavaLegacy,
        );
        let mut builder = MongoClientSettingsBuilder::new();
        let err = customizer.customize(&mut builder).unwrap_err();

        assert!(err.is_illegal_state());
        assert_eq!(builder.build().ssl().enabled(), None);
    }

    #[test]
    fn test_legacy_never_reads_details() {
        let mut bundles = MockBundles::new();
        bundles
            .expect_get_bundle()
            .withf(|name| name.to_string() == "mongo")
            .times(1)
            .returning(|name| {
                Ok(Arc::new(SslBundle::new(
                    name.to_string(),
                    SslStoreBundle::new(),
                )))
            });

        let ssl = MongoSslProperties {
            enabled: true,
            bundle: Some("mongo".to_string()),
        };
        let customizer = StandardMongoClientSettingsBuilderCustomizer::legacy(
            connection_string(),
            UuidRepresentation::PythonLegacy,
            ssl,
            Some(Arc::new(bundles)),
        );
        let mut builder = MongoClientSettingsBuilder::new();
        customizer.customize(&mut builder).unwrap();

        let settings = builder.build();
        assert_eq!(settings.ssl().enabled(), Some(true));
        assert_eq!(settings.uuid_representation(), Some(UuidRepresentation::PythonLegacy));
    }

    #[test]
    fn test_legacy_ssl_disabled_skips_registry() {
        let mut bundles = MockBundles::new();
        bundles.expect_get_bundle().never();

        let customizer = StandardMongoClientSettingsBuilderCustomizer::legacy(
            connection_string(),
            UuidRepresentation::JavaLegacy,
            MongoSslProperties {
                enabled: false,
                bundle: Some("mongo".to_string()),
            },
            Some(Arc::new(bundles)),
        );
        let mut builder = MongoClientSettingsBuilder::new();
        customizer.customize(&mut builder).unwrap();
        assert_eq!(builder.build().ssl().enabled(), None);
    }

    #[test]
    fn test_legacy_ssl_without_bundle_fails() {
        let customizer = StandardMongoClientSettingsBuilderCustomizer::legacy(
            connection_string(),
            UuidRepresentation::JavaLegacy,
            MongoSslProperties {
                enabled: true,
                bundle: None,
            },
            None,
        );
        let err = customizer
            .customize(&mut MongoClientSettingsBuilder::new())
            .unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_legacy_bundle_with_options_fails() {
        let mut bundles = MockBundles::new();
        bundles.expect_get_bundle().returning(|name| {
            Ok(Arc::new(
                SslBundle::new(name.to_string(), SslStoreBundle::new())
                    .with_options(specified_options()),
            ))
        });

        let customizer = StandardMongoClientSettingsBuilderCustomizer::legacy(
            connection_string(),
            UuidRepresentation::JavaLegacy,
            MongoSslProperties {
                enabled: true,
                bundle: Some("mongo".to_string()),
            },
            Some(Arc::new(bundles)),
        );
        let err = customizer
            .customize(&mut MongoClientSettingsBuilder::new())
            .unwrap_err();
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_order_defaults_to_zero() {
        let mut customizer = StandardMongoClientSettingsBuilderCustomizer::new(
            details(None),
            UuidRepresentation::JavaLegacy,
        );
        assert_eq!(customizer.order(), 0);
        customizer.set_order(-10);
        assert_eq!(customizer.order(), -10);
    }
}
