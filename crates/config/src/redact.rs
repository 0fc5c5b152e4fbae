//! 敏感配置值的脱敏输出

use std::collections::BTreeMap;
use std::fmt;

const REDACTED: &str = "[REDACTED]";

/// 值内嵌凭据的完整配置键
const CREDENTIAL_KEYS: &[&str] = &["sasl.jaas.config", "sasl.oauthbearer.config"];

/// 键名以 `password` 或 `secret` 结尾，或值内嵌凭据
pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.ends_with("password") || key.ends_with("secret") || CREDENTIAL_KEYS.contains(&key.as_str())
}

/// 以 `Debug` 输出配置项时屏蔽敏感值
pub struct Redacted<'a>(pub &'a BTreeMap<String, String>);

impl fmt::Debug for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(key, value)| {
                let shown = if is_sensitive_key(key) {
                    REDACTED
                } else {
                    value.as_str()
                };
                (key, shown)
            }))
            .finish()
    }
}
