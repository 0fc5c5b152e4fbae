//! autoconf-bootstrap - 启动装配
//!
//! 按顺序构建 SSL bundle 注册表、Kafka 组件和 MongoDB 客户端设置

mod infrastructure;
mod metrics;
mod runtime;

pub use infrastructure::*;
pub use self::metrics::*;
pub use runtime::*;
