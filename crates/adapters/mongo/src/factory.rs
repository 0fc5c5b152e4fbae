//! MongoDB 客户端工厂

use std::sync::Arc;

use autoconf_errors::{AppError, AppResult};
use mongodb::Client;
use mongodb::options::ClientOptions;
use tracing::info;

use crate::customizer::MongoClientSettingsBuilderCustomizer;
use crate::settings::{MongoClientSettings, MongoClientSettingsBuilder};

/// 按顺序执行定制器并创建客户端
#[derive(Clone, Default)]
pub struct MongoClientFactory {
    customizers: Vec<Arc<dyn MongoClientSettingsBuilderCustomizer>>,
}

impl MongoClientFactory {
    pub fn new(customizers: Vec<Arc<dyn MongoClientSettingsBuilderCustomizer>>) -> Self {
        Self { customizers }
    }

    pub fn with_customizer(
        mut self,
        customizer: Arc<dyn MongoClientSettingsBuilderCustomizer>,
    ) -> Self {
        self.customizers.push(customizer);
        self
    }

    /// 定制器按 order 升序执行，同序保持注册顺序
    pub fn create_settings(&self) -> AppResult<MongoClientSettings> {
        let mut sorted: Vec<&Arc<dyn MongoClientSettingsBuilderCustomizer>> =
            self.customizers.iter().collect();
        sorted.sort_by_key(|customizer| customizer.order());

        let mut builder = MongoClientSettingsBuilder::new();
        for customizer in sorted {
            customizer.customize(&mut builder)?;
        }
        Ok(builder.build())
    }

    pub async fn create_client_options(&self) -> AppResult<ClientOptions> {
        self.create_settings()?.into_client_options().await
    }

    /// 创建客户端，驱动在首次操作时才建立连接
    pub async fn create_client(&self) -> AppResult<Client> {
        let options = self.create_client_options().await?;
        let hosts = options.hosts.len();
        let client = Client::with_options(options)
            .map_err(|e| AppError::mongo(format!("Failed to create MongoDB client: {}", e)))?;
        info!(hosts, "MongoDB client created");
        Ok(client)
    }
}

impl std::fmt::Debug for MongoClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MongoClientFactory")
            .field("customizers", &self.customizers.len())
            .finish()
    }
}
