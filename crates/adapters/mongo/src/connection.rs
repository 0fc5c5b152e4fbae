//! MongoDB 连接信息

use std::sync::Arc;

use autoconf_config::MongoProperties;
use autoconf_errors::{AppError, AppResult};
use autoconf_ssl::{SslBundle, SslBundles};
use secrecy::{ExposeSecret, Secret};

const SCHEME: &str = "mongodb://";
const SRV_SCHEME: &str = "mongodb+srv://";

/// 校验过的连接串
///
/// 原文可能包含密码，只通过 `as_str` 暴露，`Debug` 输出不含凭据。
#[derive(Clone)]
pub struct ConnectionString {
    value: Secret<String>,
    srv: bool,
    username: Option<String>,
    hosts: Vec<String>,
    database: Option<String>,
}

impl ConnectionString {
    pub fn parse(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        let (srv, rest) = if let Some(rest) = value.strip_prefix(SRV_SCHEME) {
            (true, rest)
        } else if let Some(rest) = value.strip_prefix(SCHEME) {
            (false, rest)
        } else {
            return Err(AppError::validation(
                "The connection string is invalid. Connection strings must start with either 'mongodb://' or 'mongodb+srv://'",
            ));
        };

        let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
        let authority = &rest[..authority_end];
        let path = rest[authority_end..].strip_prefix('/').unwrap_or("");

        let (userinfo, host_list) = match authority.rfind('@') {
            Some(at) => (Some(&authority[..at]), &authority[at + 1..]),
            None => (None, authority),
        };

        let hosts: Vec<String> = host_list
            .split(',')
            .filter(|host| !host.is_empty())
            .map(str::to_string)
            .collect();
        if hosts.is_empty() {
            return Err(AppError::validation(
                "The connection string must contain at least one host",
            ));
        }
        if srv && hosts.len() > 1 {
            return Err(AppError::validation(
                "Only one host allowed when using mongodb+srv protocol",
            ));
        }

        let username = userinfo
            .map(|info| decode(info.split(':').next().unwrap_or(info)))
            .transpose()?;

        let database = path
            .split('?')
            .next()
            .filter(|db| !db.is_empty())
            .map(decode)
            .transpose()?;

        Ok(Self {
            value: Secret::new(value),
            srv,
            username,
            hosts,
            database,
        })
    }

    pub fn as_str(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_srv(&self) -> bool {
        self.srv
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

fn decode(value: &str) -> AppResult<String> {
    urlencoding::decode(value)
        .map(|decoded| decoded.into_owned())
        .map_err(|e| AppError::validation(format!("Invalid escape in connection string: {}", e)))
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("srv", &self.srv)
            .field("username", &self.username)
            .field("hosts", &self.hosts)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// MongoDB 连接信息提供者
#[cfg_attr(test, mockall::automock)]
pub trait MongoConnectionDetails: Send + Sync {
    fn connection_string(&self) -> ConnectionString;

    /// 需要 TLS 时返回 bundle
    fn ssl_bundle(&self) -> Option<Arc<SslBundle>> {
        None
    }
}

/// 从属性树推导的连接信息
#[derive(Debug, Clone)]
pub struct PropertiesMongoConnectionDetails {
    connection_string: ConnectionString,
    ssl_bundle: Option<Arc<SslBundle>>,
}

impl PropertiesMongoConnectionDetails {
    /// 连接串与 SSL bundle 在创建时解析
    pub fn new(
        properties: &MongoProperties,
        ssl_bundles: Option<&dyn SslBundles>,
    ) -> AppResult<Self> {
        let connection_string = ConnectionString::parse(build_connection_string(properties))?;

        let ssl = &properties.ssl;
        let ssl_bundle = if !ssl.enabled {
            None
        } else if let Some(name) = ssl.bundle.as_deref().filter(|name| !name.is_empty()) {
            let bundles = ssl_bundles.ok_or_else(|| {
                AppError::illegal_state(format!(
                    "SSL bundle '{}' is configured but no SSL bundle registry is available",
                    name
                ))
            })?;
            Some(bundles.get_bundle(name)?)
        } else {
            Some(Arc::new(SslBundle::system_default()))
        };

        Ok(Self {
            connection_string,
            ssl_bundle,
        })
    }
}

impl MongoConnectionDetails for PropertiesMongoConnectionDetails {
    fn connection_string(&self) -> ConnectionString {
        self.connection_string.clone()
    }

    fn ssl_bundle(&self) -> Option<Arc<SslBundle>> {
        self.ssl_bundle.clone()
    }
}

/// 设置了 `uri` 时直接使用，否则由 host、port、凭据等拼出连接串
pub fn build_connection_string(properties: &MongoProperties) -> String {
    if let Some(uri) = &properties.uri {
        return uri.expose_secret().clone();
    }

    let mut value = String::from(SCHEME);
    if let Some(username) = &properties.username {
        value.push_str(&urlencoding::encode(username));
        value.push(':');
        if let Some(password) = &properties.password {
            value.push_str(&urlencoding::encode(password.expose_secret()));
        }
        value.push('@');
    }

    value.push_str(
        properties
            .host
            .as_deref()
            .unwrap_or(MongoProperties::DEFAULT_HOST),
    );
    value.push(':');
    value.push_str(
        &properties
            .port
            .unwrap_or(MongoProperties::DEFAULT_PORT)
            .to_string(),
    );
    for host in &properties.additional_hosts {
        value.push(',');
        value.push_str(host);
    }

    value.push('/');
    value.push_str(&urlencoding::encode(properties.mongo_client_database()));

    let mut options = Vec::new();
    if let Some(replica_set) = &properties.replica_set_name {
        options.push(format!("replicaSet={}", urlencoding::encode(replica_set)));
    }
    if properties.username.is_some() {
        if let Some(auth_db) = &properties.authentication_database {
            options.push(format!("authSource={}", urlencoding::encode(auth_db)));
        }
    }
    if !options.is_empty() {
        value.push('?');
        value.push_str(&options.join("&"));
    }
    value
}
