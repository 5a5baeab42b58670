//! Offline input: Output and Secret records from a multi-document YAML file.

use anyhow::{anyhow, bail, Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::ResourceExt;
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::warn;

use fluo_core::memory::MemorySecrets;
use fluo_core::Output;

use crate::decode_secret;

fn max_yaml_bytes() -> usize {
    std::env::var("FLUO_MAX_YAML_BYTES")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(1_000_000) // 1 MiB default
}

#[derive(Debug, Default)]
pub struct Manifests {
    /// In file order; this is the render order.
    pub outputs: Vec<Output>,
    pub secrets: MemorySecrets,
}

/// Parse every document; records without a namespace land in `default_ns`.
/// Kinds other than Output and Secret are skipped with a warning.
pub fn parse_manifests(yaml: &str, default_ns: &str) -> Result<Manifests> {
    if yaml.len() > max_yaml_bytes() {
        bail!("YAML payload too large (>{} bytes)", max_yaml_bytes());
    }
    let mut out = Manifests::default();
    for (idx, doc) in serde_yaml::Deserializer::from_str(yaml).enumerate() {
        let val = serde_yaml::Value::deserialize(doc).with_context(|| format!("parsing YAML document #{}", idx))?;
        if val.is_null() { continue; }
        let json = serde_json::to_value(val).context("converting YAML to JSON")?;
        let kind = json
            .get("kind")
            .and_then(Json::as_str)
            .ok_or_else(|| anyhow!("YAML document #{} missing kind", idx))?
            .to_string();
        match kind.as_str() {
            "Output" => {
                let mut o: Output =
                    serde_json::from_value(json).with_context(|| format!("decoding Output in document #{}", idx))?;
                if o.metadata.namespace.is_none() {
                    o.metadata.namespace = Some(default_ns.to_string());
                }
                out.outputs.push(o);
            }
            "Secret" => {
                let s: Secret =
                    serde_json::from_value(json).with_context(|| format!("decoding Secret in document #{}", idx))?;
                let name = s.metadata.name.clone().ok_or_else(|| anyhow!("Secret in document #{} missing metadata.name", idx))?;
                let ns = s.namespace().unwrap_or_else(|| default_ns.to_string());
                out.secrets.insert(&ns, &name, decode_secret(&s));
            }
            other => warn!(kind = %other, doc = idx, "skipping unsupported manifest kind"),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fluo_core::SecretStore;

    const FILE: &str = r#"
apiVersion: logging.pf9.io/v1alpha1
kind: Output
metadata:
  name: es-objstore
spec:
  type: elasticsearch
  params:
    - name: url
      value: http://elasticsearch.logging.svc.cluster.local:9200
    - name: password
      valueFrom:
        name: es-creds
        key: password
---
apiVersion: v1
kind: Secret
metadata:
  name: es-creds
data:
  password: Y2hhbmdlbWU=
---
apiVersion: v1
kind: ConfigMap
metadata:
  name: unrelated
"#;

    #[tokio::test]
    async fn outputs_and_secrets_are_split() {
        let m = parse_manifests(FILE, "logging").unwrap();
        assert_eq!(m.outputs.len(), 1);
        assert_eq!(m.outputs[0].key(), "logging/es-objstore");
        assert_eq!(m.secrets.len(), 1);
        let data = m.secrets.get_secret("logging", "es-creds").await.unwrap();
        assert_eq!(data.get("password").map(String::as_str), Some("changeme"));
    }

    #[test]
    fn document_without_kind_is_rejected() {
        let err = parse_manifests("metadata:\n  name: x\n", "logging").unwrap_err().to_string();
        assert!(err.contains("missing kind"), "{}", err);
    }

    #[test]
    fn empty_documents_are_ignored() {
        let m = parse_manifests("---\n---\n", "logging").unwrap();
        assert!(m.outputs.is_empty() && m.secrets.is_empty());
    }
}
