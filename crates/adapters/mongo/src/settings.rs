//! MongoDB 客户端设置
//!
//! 定制器在这里累积设置，最终转换为驱动的 `ClientOptions`

use std::path::PathBuf;

use autoconf_config::UuidRepresentation;
use autoconf_errors::{AppError, AppResult};
use autoconf_ssl::SslContext;
use mongodb::options::{ClientOptions, Tls, TlsOptions};
use tracing::{debug, warn};

use crate::connection::ConnectionString;

/// SSL 设置
///
/// `enabled` 为 `None` 表示没有任何定制器设置过，与显式的 `false` 不同。
#[derive(Debug, Clone, Default)]
pub struct SslSettings {
    enabled: Option<bool>,
    context: Option<SslContext>,
}

impl SslSettings {
    pub fn enabled(&self) -> Option<bool> {
        self.enabled
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn context(&self) -> Option<&SslContext> {
        self.context.as_ref()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SslSettingsBuilder {
    settings: SslSettings,
}

impl SslSettingsBuilder {
    pub fn enabled(&mut self, enabled: bool) -> &mut Self {
        self.settings.enabled = Some(enabled);
        self
    }

    pub fn context(&mut self, context: SslContext) -> &mut Self {
        self.settings.context = Some(context);
        self
    }

    pub fn build(&self) -> SslSettings {
        self.settings.clone()
    }
}

/// 客户端设置构建器
#[derive(Debug, Clone, Default)]
pub struct MongoClientSettingsBuilder {
    connection_string: Option<ConnectionString>,
    uuid_representation: Option<UuidRepresentation>,
    application_name: Option<String>,
    ssl: SslSettingsBuilder,
}

impl MongoClientSettingsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uuid_representation(&mut self, representation: UuidRepresentation) -> &mut Self {
        self.uuid_representation = Some(representation);
        self
    }

    pub fn apply_connection_string(&mut self, connection_string: ConnectionString) -> &mut Self {
        self.connection_string = Some(connection_string);
        self
    }

    pub fn application_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.application_name = Some(name.into());
        self
    }

    /// 在回调中修改 SSL 设置，回调失败时设置保持不变
    pub fn apply_to_ssl_settings<F>(&mut self, block: F) -> AppResult<&mut Self>
    where
        F: FnOnce(&mut SslSettingsBuilder) -> AppResult<()>,
    {
        let mut ssl = self.ssl.clone();
        block(&mut ssl)?;
        self.ssl = ssl;
        Ok(self)
    }

    pub fn build(&self) -> MongoClientSettings {
        MongoClientSettings {
            connection_string: self.connection_string.clone(),
            uuid_representation: self.uuid_representation,
            application_name: self.application_name.clone(),
            ssl: self.ssl.build(),
        }
    }
}

/// 定制完成的客户端设置
#[derive(Debug, Clone)]
pub struct MongoClientSettings {
    connection_string: Option<ConnectionString>,
    uuid_representation: Option<UuidRepresentation>,
    application_name: Option<String>,
    ssl: SslSettings,
}

impl MongoClientSettings {
    pub fn builder() -> MongoClientSettingsBuilder {
        MongoClientSettingsBuilder::new()
    }

    pub fn connection_string(&self) -> Option<&ConnectionString> {
        self.connection_string.as_ref()
    }

    pub fn uuid_representation(&self) -> Option<UuidRepresentation> {
        self.uuid_representation
    }

    pub fn application_name(&self) -> Option<&str> {
        self.application_name.as_deref()
    }

    pub fn ssl(&self) -> &SslSettings {
        &self.ssl
    }

    /// 转换为驱动选项
    ///
    /// 连接串中的选项先生效，SSL 设置随后覆盖其中的 TLS 部分。
    pub async fn into_client_options(self) -> AppResult<ClientOptions> {
        let mut options = match &self.connection_string {
            Some(connection_string) => ClientOptions::parse(connection_string.as_str())
                .await
                .map_err(|e| AppError::mongo(format!("Invalid MongoDB connection string: {}", e)))?,
            None => ClientOptions::builder().build(),
        };

        if let Some(name) = self.application_name {
            options.app_name = Some(name);
        }

        match self.ssl.enabled {
            Some(true) => {
                let tls = match &self.ssl.context {
                    Some(context) => tls_options(context)?,
                    None => TlsOptions::default(),
                };
                options.tls = Some(Tls::Enabled(tls));
            }
            Some(false) => options.tls = Some(Tls::Disabled),
            None => {}
        }

        if let Some(representation) = self.uuid_representation {
            // 驱动按值类型选择 UUID 编码，这里只记录
            debug!(uuid_representation = representation.as_str(), "MongoDB UUID representation");
        }

        Ok(options)
    }
}

/// 驱动要求证书与私钥位于同一个 PEM 文件
fn tls_options(context: &SslContext) -> AppResult<TlsOptions> {
    let mut tls = TlsOptions::default();
    tls.ca_file_path = context.ca_location.clone();

    let cert_key: Option<PathBuf> = match (&context.certificate_location, &context.key_location) {
        (Some(cert), Some(key)) if cert != key => {
            return Err(AppError::mongo(format!(
                "MongoDB requires the client certificate and private key in one PEM file, got {} and {}",
                cert.display(),
                key.display()
            )));
        }
        (Some(cert), _) => Some(cert.clone()),
        (None, key) => key.clone(),
    };
    tls.cert_key_file_path = cert_key;

    if context.key_password.is_some() {
        warn!("Encrypted private keys are not supported by the MongoDB driver, key password ignored");
    }
    if !context.verify_hostname {
        warn!("Hostname verification cannot be disabled for MongoDB, setting ignored");
    }
    Ok(tls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoconf_ssl::{SslBundle, SslStoreBundle};

    #[test]
    fn test_ssl_unset_by_default() {
        let settings = MongoClientSettings::builder().build();
        assert_eq!(settings.ssl().enabled(), None);
        assert!(!settings.ssl().is_enabled());
        assert!(settings.connection_string().is_none());
    }

    #[test]
    fn test_failed_ssl_block_leaves_settings() {
        let mut builder = MongoClientSettings::builder();
        let result = builder.apply_to_ssl_settings(|ssl| {
            ssl.enabled(true);
            Err(AppError::illegal_state("rejected"))
        });
        assert!(result.is_err());
        assert_eq!(builder.build().ssl().enabled(), None);
    }

    #[tokio::test]
    async fn test_into_client_options_plain() {
        let mut builder = MongoClientSettings::builder();
        builder
            .apply_connection_string(ConnectionString::parse("mongodb://localhost:27017").unwrap())
            .uuid_representation(UuidRepresentation::Standard)
            .application_name("orders");

        let options = builder.build().into_client_options().await.unwrap();
        assert_eq!(options.hosts.len(), 1);
        assert_eq!(options.app_name.as_deref(), Some("orders"));
        assert!(options.tls.is_none());
    }

    #[tokio::test]
    async fn test_into_client_options_with_tls_context() {
        let ca = tempfile::NamedTempFile::new().unwrap();
        let context = SslBundle::new("mongo", SslStoreBundle::new().with_ca(ca.path()))
            .create_ssl_context()
            .unwrap();

        let mut builder = MongoClientSettings::builder();
        builder
            .apply_connection_string(ConnectionString::parse("mongodb://localhost:27017").unwrap())
            .apply_to_ssl_settings(|ssl| {
                ssl.enabled(true).context(context);
                Ok(())
            })
            .unwrap();

        let options = builder.build().into_client_options().await.unwrap();
        match options.tls {
            Some(Tls::Enabled(tls)) => {
                assert_eq!(tls.ca_file_path.as_deref(), Some(ca.path()));
                assert!(tls.cert_key_file_path.is_none());
            }
            other => panic!("expected TLS enabled, got {:?}", other),
        }
    }

    #[test]
    fn test_split_cert_and_key_rejected() {
        let cert = tempfile::NamedTempFile::new().unwrap();
        let key = tempfile::NamedTempFile::new().unwrap();
        let context = SslBundle::new(
            "mongo",
            SslStoreBundle::new().with_client_cert(cert.path(), key.path()),
        )
        .create_ssl_context()
        .unwrap();

        let err = tls_options(&context).unwrap_err();
        assert!(matches!(err, AppError::Mongo(_)));
    }
}
