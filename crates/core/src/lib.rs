//! Fluo core types: the `Output` custom resource, operator configuration,
//! the error taxonomy and the collaborator traits the pipeline is wired through.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use async_trait::async_trait;
use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod memory;

pub use config::{ConfigTarget, OperatorConfig};
pub use error::{FluoError, Result};

/// API group of the `Output` resource.
pub const API_GROUP: &str = "logging.pf9.io";
/// Served version of the `Output` resource.
pub const API_VERSION: &str = "v1alpha1";

/// Desired state of an `Output`: where one stream of logs is delivered.
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "logging.pf9.io",
    version = "v1alpha1",
    kind = "Output",
    plural = "outputs",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    /// Backend kind (stdout, elasticsearch, s3, loki, ender). Case-insensitive.
    #[serde(rename = "type")]
    pub output_type: String,
    /// Backend parameters, rendered as `key value` lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<Param>,
}

/// One backend parameter: a literal `value` or a reference into a Secret.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Param {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<ValueFrom>,
}

impl Param {
    pub fn literal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into(), value_from: None }
    }

    pub fn from_secret(name: impl Into<String>, secret: SecretRef) -> Self {
        Self {
            name: name.into(),
            value: String::new(),
            value_from: Some(ValueFrom { name: secret.name, namespace: secret.namespace, key: secret.key }),
        }
    }
}

/// Reference to a key of a Kubernetes Secret, as written in an `Output`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ValueFrom {
    pub name: String,
    /// Empty means the namespace of the owning `Output`.
    #[serde(default)]
    pub namespace: String,
    pub key: String,
}

/// Fully qualified (namespace, name, key) triple the secret resolver works on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SecretRef {
    pub namespace: String,
    pub name: String,
    pub key: String,
}

impl SecretRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, key: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into(), key: key.into() }
    }

    /// Qualify a `valueFrom`, defaulting its namespace to `default_ns`.
    pub fn qualify(vf: &ValueFrom, default_ns: &str) -> Self {
        let namespace = if vf.namespace.is_empty() { default_ns } else { vf.namespace.as_str() };
        Self::new(namespace, vf.name.clone(), vf.key.clone())
    }
}

impl std::fmt::Display for SecretRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}[{}]", self.namespace, self.name, self.key)
    }
}

impl Output {
    /// Build a namespaced `Output`; mostly useful for tests and manifests built in code.
    pub fn namespaced(namespace: &str, name: &str, output_type: &str, params: Vec<Param>) -> Self {
        let mut out = Output::new(name, OutputSpec { output_type: output_type.to_string(), params });
        out.metadata.namespace = Some(namespace.to_string());
        out
    }

    /// `namespace/name` identity used in logs and errors.
    pub fn key(&self) -> String {
        match self.namespace() {
            Some(ns) => format!("{}/{}", ns, self.name_any()),
            None => self.name_any(),
        }
    }
}

/// Resolved backend parameters. Ordered so rendered blocks are byte-stable.
pub type ParamMap = BTreeMap<String, String>;

/// Why a reconciliation cycle was requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trigger {
    Applied { namespace: Option<String>, name: String },
    Deleted { namespace: Option<String>, name: String },
    Resync,
    Retry,
}

/// Lists the current set of `Output` records.
#[async_trait]
pub trait OutputSource: Send + Sync {
    async fn list_outputs(&self) -> anyhow::Result<Vec<Output>>;
}

/// Fetches a Secret's decoded key/value pairs. Not-found is an error.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get_secret(&self, namespace: &str, name: &str) -> anyhow::Result<BTreeMap<String, String>>;
}

/// Ensures a keyed configuration object holds exactly `content` and the target's labels.
#[async_trait]
pub trait ConfigSink: Send + Sync {
    async fn ensure_config(&self, target: &ConfigTarget, content: &[u8]) -> anyhow::Result<()>;
}

pub mod prelude {
    pub use super::{
        ConfigSink, ConfigTarget, FluoError, OperatorConfig, Output, OutputSource, OutputSpec, Param, ParamMap,
        SecretRef, SecretStore, Trigger, ValueFrom,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_deserializes_from_manifest() {
        let v = serde_json::json!({
            "apiVersion": "logging.pf9.io/v1alpha1",
            "kind": "Output",
            "metadata": { "name": "es-objstore", "namespace": "logging" },
            "spec": {
                "type": "Elasticsearch",
                "params": [
                    { "name": "url", "value": "http://es:9200" },
                    { "name": "user", "valueFrom": { "name": "es-creds", "key": "user" } }
                ]
            }
        });
        let out: Output = serde_json::from_value(v).unwrap();
        assert_eq!(out.key(), "logging/es-objstore");
        assert_eq!(out.spec.output_type, "Elasticsearch");
        assert_eq!(out.spec.params.len(), 2);
        assert_eq!(out.spec.params[0].value, "http://es:9200");
        let vf = out.spec.params[1].value_from.as_ref().unwrap();
        assert_eq!(vf.namespace, "");
        assert_eq!(SecretRef::qualify(vf, "logging"), SecretRef::new("logging", "es-creds", "user"));
    }

    #[test]
    fn explicit_secret_namespace_wins() {
        let vf = ValueFrom { name: "s".into(), namespace: "other".into(), key: "k".into() };
        assert_eq!(SecretRef::qualify(&vf, "logging").namespace, "other");
    }
}
