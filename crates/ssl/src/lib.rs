//! autoconf-ssl - SSL bundle 支持
//!
//! 按名称注册和查找 TLS 材料：
//! - `SslBundle`：证书、私钥、信任库和协议选项
//! - `SslBundles`：按名称解析 bundle 的注册表
//! - `SslContext`：bundle 生成的、可直接交给客户端库的 TLS 材料

mod bundle;
mod registry;

pub use bundle::*;
pub use registry::*;
