//! autoconf-adapter-kafka - Kafka 组件装配
//!
//! 从属性树装配 Kafka 客户端组件：
//! - producer / consumer 工厂与定制器
//! - KafkaTemplate、事务管理器、Admin
//! - JAAS 登录配置
//! - 重试 topic 与退避策略

mod admin;
mod autoconfigure;
mod connection;
mod factory;
mod jaas;
mod properties;
mod retry;
mod template;
mod transaction;

pub use admin::*;
pub use autoconfigure::*;
pub use connection::*;
pub use factory::*;
pub use jaas::*;
pub use properties::*;
pub use retry::*;
pub use template::*;
pub use transaction::*;
