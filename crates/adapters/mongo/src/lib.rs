//! autoconf-adapter-mongo - MongoDB 客户端设置
//!
//! 把连接串、UUID 编码和 SSL bundle 应用到客户端设置上，
//! 再转换为 `mongodb::options::ClientOptions`。

mod connection;
mod customizer;
mod factory;
mod settings;

pub use connection::*;
pub use customizer::*;
pub use factory::*;
pub use settings::*;
