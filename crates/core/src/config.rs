//! Operator configuration. Built once by the binary and passed down; nothing reads globals.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_NAMESPACE: &str = "logging";
pub const DEFAULT_CONFIG_MAP: &str = "fluentd-config";
pub const DEFAULT_CONFIG_KEY: &str = "fluent.conf";
pub const DEFAULT_FORWARD_PORT: u16 = 62073;
pub const DEFAULT_RELOAD_PORT: u16 = 45550;
pub const DEFAULT_RELOAD_HOST: &str = "fluentd.logging.svc.cluster.local";
pub const DEFAULT_INDEX_PREFIX: &str = "fluentd";
pub const DEFAULT_MATCH_PATTERN: &str = "kube.**";
pub const DEFAULT_RELOAD_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_RESYNC_SECS: u64 = 300;

/// Labels the operator enforces on the objects it owns.
pub fn default_labels() -> BTreeMap<String, String> {
    [
        ("k8s-app", "fluentd"),
        ("kubernetes.io/cluster-service", "true"),
        ("created_by", "fluentd-operator"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConfig {
    /// Namespace the forwarder and its configuration object live in.
    pub namespace: String,
    pub config_map: String,
    /// Key inside the configuration object holding the document.
    pub config_key: String,
    pub labels: BTreeMap<String, String>,
    pub forward_port: u16,
    pub reload_host: String,
    pub reload_port: u16,
    pub reload_timeout_ms: u64,
    pub resync_secs: u64,
    /// Prefix of the derived elasticsearch `index_name`.
    pub index_prefix: String,
    /// Tag pattern of every per-output `<match>` block.
    pub match_pattern: String,
    /// Require static AWS credentials on s3 outputs.
    pub s3_require_static_credentials: bool,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            config_map: DEFAULT_CONFIG_MAP.to_string(),
            config_key: DEFAULT_CONFIG_KEY.to_string(),
            labels: default_labels(),
            forward_port: DEFAULT_FORWARD_PORT,
            reload_host: DEFAULT_RELOAD_HOST.to_string(),
            reload_port: DEFAULT_RELOAD_PORT,
            reload_timeout_ms: DEFAULT_RELOAD_TIMEOUT_MS,
            resync_secs: DEFAULT_RESYNC_SECS,
            index_prefix: DEFAULT_INDEX_PREFIX.to_string(),
            match_pattern: DEFAULT_MATCH_PATTERN.to_string(),
            s3_require_static_credentials: false,
        }
    }
}

impl OperatorConfig {
    pub fn reload_url(&self) -> String {
        format!("http://{}:{}/api/config.reload", self.reload_host, self.reload_port)
    }

    pub fn reload_timeout(&self) -> Duration { Duration::from_millis(self.reload_timeout_ms) }

    pub fn resync_period(&self) -> Duration { Duration::from_secs(self.resync_secs.max(1)) }

    pub fn config_target(&self) -> ConfigTarget {
        ConfigTarget {
            namespace: self.namespace.clone(),
            name: self.config_map.clone(),
            key: self.config_key.clone(),
            labels: self.labels.clone(),
        }
    }
}

/// Where the assembled document is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigTarget {
    pub namespace: String,
    pub name: String,
    pub key: String,
    pub labels: BTreeMap<String, String>,
}

impl std::fmt::Display for ConfigTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_forwarder_deployment() {
        let cfg = OperatorConfig::default();
        assert_eq!(cfg.reload_url(), "http://fluentd.logging.svc.cluster.local:45550/api/config.reload");
        assert_eq!(cfg.forward_port, 62073);
        assert_eq!(cfg.config_target().to_string(), "logging/fluentd-config[fluent.conf]");
        assert_eq!(cfg.labels.get("k8s-app").map(String::as_str), Some("fluentd"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: OperatorConfig = serde_json::from_value(serde_json::json!({ "reload_port": 1234 })).unwrap();
        assert_eq!(cfg.reload_port, 1234);
        assert_eq!(cfg.namespace, DEFAULT_NAMESPACE);
    }
}
