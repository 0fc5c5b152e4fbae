//! MongoDB 属性树

use secrecy::Secret;
use serde::Deserialize;

/// UUID 的 BSON 编码方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UuidRepresentation {
    Unspecified,
    Standard,
    CSharpLegacy,
    #[default]
    JavaLegacy,
    PythonLegacy,
}

impl UuidRepresentation {
    pub fn as_str(&self) -> &'static str {
        match self {
            UuidRepresentation::Unspecified => "unspecified",
            UuidRepresentation::Standard => "standard",
            UuidRepresentation::CSharpLegacy => "csharpLegacy",
            UuidRepresentation::JavaLegacy => "javaLegacy",
            UuidRepresentation::PythonLegacy => "pythonLegacy",
        }
    }
}

/// MongoDB SSL 属性
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MongoSslProperties {
    pub enabled: bool,
    pub bundle: Option<String>,
}

/// MongoDB 属性
///
/// 设置了 `uri` 时其余连接属性（host、port、凭据等）不参与连接串构建。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MongoProperties {
    pub uri: Option<Secret<String>>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// 额外的 `host:port` 列表
    pub additional_hosts: Vec<String>,
    pub database: Option<String>,
    pub authentication_database: Option<String>,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub replica_set_name: Option<String>,
    pub uuid_representation: UuidRepresentation,
    pub ssl: MongoSslProperties,
}

impl MongoProperties {
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_PORT: u16 = 27017;
    pub const DEFAULT_DATABASE: &'static str = "test";

    /// 实际使用的数据库名
    pub fn mongo_client_database(&self) -> &str {
        self.database.as_deref().unwrap_or(Self::DEFAULT_DATABASE)
    }
}
