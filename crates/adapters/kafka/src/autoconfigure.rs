//! Kafka 组件装配
//!
//! 按固定顺序执行装配步骤。调用方提供的组件会跳过对应步骤，不做合并。

use std::sync::Arc;

use autoconf_config::KafkaProperties;
use autoconf_errors::AppResult;
use autoconf_ssl::SslBundles;
use tracing::{debug, info};

use crate::admin::KafkaAdmin;
use crate::connection::{Configuration, KafkaConnectionDetails, PropertiesKafkaConnectionDetails};
use crate::factory::{
    ConsumerFactory, ConsumerFactoryCustomizer, DefaultConsumerFactory, DefaultProducerFactory,
    ProducerFactory, ProducerFactoryCustomizer, sorted_by_order,
};
use crate::jaas::KafkaJaasLoginModuleInitializer;
use crate::properties::{
    BOOTSTRAP_SERVERS_CONFIG, ClientProperties, apply_security_protocol, apply_ssl_bundle,
    build_admin_properties, build_consumer_properties, build_producer_properties,
};
use crate::retry::{BackOffPolicy, RetryTopicConfiguration, RetryTopicConfigurationBuilder};
use crate::template::{
    KafkaTemplate, LoggingProducerListener, ProducerListener, RecordMessageConverter,
};
use crate::transaction::KafkaTransactionManager;

/// 步骤结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Created,
    Skipped,
}

impl StepOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Created => "created",
            StepOutcome::Skipped => "skipped",
        }
    }
}

/// 单个装配步骤的记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub component: &'static str,
    pub outcome: StepOutcome,
}

/// 调用方提供的组件
///
/// 每个 `Some` 都会让对应的装配步骤跳过。
#[derive(Clone, Default)]
pub struct KafkaOverrides {
    pub connection_details: Option<Arc<dyn KafkaConnectionDetails>>,
    pub jaas_initializer: Option<Arc<KafkaJaasLoginModuleInitializer>>,
    pub producer_listener: Option<Arc<dyn ProducerListener>>,
    pub producer_factory: Option<Arc<dyn ProducerFactory>>,
    pub consumer_factory: Option<Arc<dyn ConsumerFactory>>,
    /// 非空时不创建默认模板
    pub templates: Vec<Arc<KafkaTemplate>>,
    pub transaction_manager: Option<Arc<KafkaTransactionManager>>,
    pub admin: Option<Arc<KafkaAdmin>>,
    pub retry_topic_configuration: Option<Arc<RetryTopicConfiguration>>,
    /// 只有恰好一个时才会装到模板上
    pub message_converters: Vec<Arc<dyn RecordMessageConverter>>,
    pub producer_customizers: Vec<Arc<dyn ProducerFactoryCustomizer>>,
    pub consumer_customizers: Vec<Arc<dyn ConsumerFactoryCustomizer>>,
}

/// 装配结果
pub struct KafkaComponents {
    pub connection_details: Arc<dyn KafkaConnectionDetails>,
    pub jaas_initializer: Option<Arc<KafkaJaasLoginModuleInitializer>>,
    pub producer_listener: Arc<dyn ProducerListener>,
    pub producer_factory: Arc<dyn ProducerFactory>,
    pub consumer_factory: Arc<dyn ConsumerFactory>,
    pub templates: Vec<Arc<KafkaTemplate>>,
    pub transaction_manager: Option<Arc<KafkaTransactionManager>>,
    pub admin: Arc<KafkaAdmin>,
    pub retry_topic_configuration: Option<Arc<RetryTopicConfiguration>>,
    pub report: Vec<StepReport>,
}

impl KafkaComponents {
    /// 唯一的模板，存在多个时返回 `None`
    pub fn template(&self) -> Option<&Arc<KafkaTemplate>> {
        match self.templates.as_slice() {
            [template] => Some(template),
            _ => None,
        }
    }

    pub fn outcome(&self, component: &str) -> Option<StepOutcome> {
        self.report
            .iter()
            .find(|step| step.component == component)
            .map(|step| step.outcome)
    }
}

impl std::fmt::Debug for KafkaComponents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaComponents")
            .field("templates", &self.templates)
            .field("transaction_manager", &self.transaction_manager)
            .field("admin", &self.admin)
            .field("retry_topic_configuration", &self.retry_topic_configuration)
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

/// Kafka 自动装配
pub struct KafkaAutoConfiguration {
    properties: KafkaProperties,
    ssl_bundles: Option<Arc<dyn SslBundles>>,
}

impl KafkaAutoConfiguration {
    pub fn new(properties: KafkaProperties) -> Self {
        Self {
            properties,
            ssl_bundles: None,
        }
    }

    pub fn with_ssl_bundles(mut self, ssl_bundles: Arc<dyn SslBundles>) -> Self {
        self.ssl_bundles = Some(ssl_bundles);
        self
    }

    pub fn properties(&self) -> &KafkaProperties {
        &self.properties
    }

    /// 依次执行装配步骤
    pub fn configure(&self, overrides: KafkaOverrides) -> AppResult<KafkaComponents> {
        let mut report = Vec::new();
        let mut record = |component: &'static str, outcome: StepOutcome| {
            match outcome {
                StepOutcome::Created => info!(component, "Kafka component created"),
                StepOutcome::Skipped => debug!(component, "Kafka component skipped"),
            }
            report.push(StepReport { component, outcome });
        };

        // 1. 连接信息
        let connection_details = match overrides.connection_details {
            Some(details) => {
                record("connection_details", StepOutcome::Skipped);
                details
            }
            None => {
                let details = PropertiesKafkaConnectionDetails::new(
                    &self.properties,
                    self.ssl_bundles.as_deref(),
                )?;
                record("connection_details", StepOutcome::Created);
                Arc::new(details)
            }
        };

        // 2. JAAS
        let jaas_initializer = match overrides.jaas_initializer {
            Some(initializer) => {
                record("jaas_initializer", StepOutcome::Skipped);
                Some(initializer)
            }
            None if self.properties.jaas.enabled => {
                let initializer = KafkaJaasLoginModuleInitializer::new(&self.properties.jaas)?;
                record("jaas_initializer", StepOutcome::Created);
                Some(Arc::new(initializer))
            }
            None => {
                record("jaas_initializer", StepOutcome::Skipped);
                None
            }
        };

        let role_properties = |mut client: ClientProperties, connection: Configuration| {
            apply_connection(&mut client, &connection);
            if let Some(jaas) = &jaas_initializer {
                jaas.apply(&mut client);
            }
            client
        };

        // 3. 发送监听器
        let producer_listener: Arc<dyn ProducerListener> = match overrides.producer_listener {
            Some(listener) => {
                record("producer_listener", StepOutcome::Skipped);
                listener
            }
            None => {
                record("producer_listener", StepOutcome::Created);
                Arc::new(LoggingProducerListener::default())
            }
        };

        // 4. producer 工厂
        let producer_factory: Arc<dyn ProducerFactory> = match overrides.producer_factory {
            Some(factory) => {
                record("producer_factory", StepOutcome::Skipped);
                factory
            }
            None => {
                let client = role_properties(
                    build_producer_properties(&self.properties),
                    connection_details.producer(),
                );
                let mut factory = DefaultProducerFactory::new(client);
                if let Some(prefix) = non_empty(&self.properties.producer.transaction_id_prefix) {
                    factory.set_transaction_id_prefix(prefix);
                }
                for customizer in
                    sorted_by_order(&overrides.producer_customizers, |c| c.order())
                {
                    customizer.customize(&mut factory);
                }
                record("producer_factory", StepOutcome::Created);
                Arc::new(factory)
            }
        };

        // 5. consumer 工厂
        let consumer_factory: Arc<dyn ConsumerFactory> = match overrides.consumer_factory {
            Some(factory) => {
                record("consumer_factory", StepOutcome::Skipped);
                factory
            }
            None => {
                let client = role_properties(
                    build_consumer_properties(&self.properties),
                    connection_details.consumer(),
                );
                let mut factory = DefaultConsumerFactory::new(client);
                for customizer in
                    sorted_by_order(&overrides.consumer_customizers, |c| c.order())
                {
                    customizer.customize(&mut factory);
                }
                record("consumer_factory", StepOutcome::Created);
                Arc::new(factory)
            }
        };

        // 6. 模板
        let templates = if overrides.templates.is_empty() {
            let template_properties = &self.properties.template;
            let mut template = KafkaTemplate::new(producer_factory.clone());
            template.set_producer_listener(producer_listener.clone());
            match overrides.message_converters.as_slice() {
                [] => {}
                [converter] => template.set_message_converter(converter.clone()),
                converters => debug!(
                    count = converters.len(),
                    "Multiple message converters registered, none applied"
                ),
            }
            if let Some(topic) = &template_properties.default_topic {
                template.set_default_topic(topic.as_str());
            }
            if let Some(prefix) = non_empty(&template_properties.transaction_id_prefix) {
                template.set_transaction_id_prefix(prefix);
            }
            if let Some(enabled) = template_properties.observation_enabled {
                template.set_observation_enabled(enabled);
            }
            record("template", StepOutcome::Created);
            vec![Arc::new(template)]
        } else {
            record("template", StepOutcome::Skipped);
            overrides.templates
        };

        // 7. 事务管理器
        let transaction_manager = match overrides.transaction_manager {
            Some(manager) => {
                record("transaction_manager", StepOutcome::Skipped);
                Some(manager)
            }
            None if non_empty(&self.properties.producer.transaction_id_prefix).is_some() => {
                let manager = KafkaTransactionManager::new(producer_factory.clone())?;
                record("transaction_manager", StepOutcome::Created);
                Some(Arc::new(manager))
            }
            None => {
                record("transaction_manager", StepOutcome::Skipped);
                None
            }
        };

        // 8. Admin
        let admin = match overrides.admin {
            Some(admin) => {
                record("admin", StepOutcome::Skipped);
                admin
            }
            None => {
                let admin_properties = &self.properties.admin;
                let client = role_properties(
                    build_admin_properties(&self.properties),
                    connection_details.admin(),
                );
                let mut admin = KafkaAdmin::new(client);
                if let Some(secs) = admin_properties.close_timeout_secs {
                    admin.set_close_timeout(secs);
                }
                if let Some(secs) = admin_properties.operation_timeout_secs {
                    admin.set_operation_timeout(secs);
                }
                admin.set_fatal_if_broker_not_available(admin_properties.fail_fast);
                admin.set_modify_topic_configs(admin_properties.modify_topic_configs);
                admin.set_auto_create(admin_properties.auto_create);
                record("admin", StepOutcome::Created);
                Arc::new(admin)
            }
        };

        // 9. 重试 topic
        let retry_topic = &self.properties.retry.topic;
        let retry_topic_configuration = match (
            overrides.retry_topic_configuration,
            templates.as_slice(),
        ) {
            (Some(configuration), _) => {
                record("retry_topic_configuration", StepOutcome::Skipped);
                Some(configuration)
            }
            (None, [template]) if retry_topic.enabled => {
                let configuration = RetryTopicConfigurationBuilder::new_instance()
                    .max_attempts(retry_topic.attempts)
                    .use_single_topic_for_same_intervals()
                    .suffix_topics_with_index_values()
                    .do_not_auto_create_retry_topics()
                    .back_off(BackOffPolicy::from_properties(&retry_topic.backoff))
                    .create(template.clone());
                record("retry_topic_configuration", StepOutcome::Created);
                Some(Arc::new(configuration))
            }
            (None, _) => {
                if retry_topic.enabled {
                    debug!(
                        templates = templates.len(),
                        "Retry topic enabled but no single template candidate"
                    );
                }
                record("retry_topic_configuration", StepOutcome::Skipped);
                None
            }
        };

        Ok(KafkaComponents {
            connection_details,
            jaas_initializer,
            producer_listener,
            producer_factory,
            consumer_factory,
            templates,
            transaction_manager,
            admin,
            retry_topic_configuration,
            report,
        })
    }
}

/// 连接信息覆盖属性树中的连接配置
///
/// broker 总是覆盖，安全协议非空时写入，bundle 存在时写入。
pub fn apply_connection(properties: &mut ClientProperties, connection: &Configuration) {
    properties.set(BOOTSTRAP_SERVERS_CONFIG, connection.bootstrap_servers_string());
    apply_security_protocol(properties, connection.security_protocol());
    apply_ssl_bundle(properties, connection.ssl_bundle());
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
