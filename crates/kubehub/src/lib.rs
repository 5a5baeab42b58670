//! Fluo kubehub: kube-rs backed collaborators (Output listing, Secret reads,
//! ConfigMap publishing) and the Output watcher.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use kube::{
    api::{Api, ListParams, Patch, PatchParams},
    runtime::{
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client, ResourceExt,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fluo_core::{ConfigSink, ConfigTarget, Output, OutputSource, SecretStore, Trigger};

pub mod manifest;

/// Field manager name used for server-side apply.
pub const FIELD_MANAGER: &str = "fluo";

pub async fn get_kube_client() -> Result<Client> {
    Client::try_default().await.context("creating kube client from default config")
}

/// Cluster-backed implementation of every collaborator the reconciler needs.
#[derive(Clone)]
pub struct KubeHub {
    client: Client,
    /// Restrict Output listing to one namespace; `None` lists cluster-wide.
    watch_ns: Option<String>,
}

impl KubeHub {
    pub fn new(client: Client, watch_ns: Option<String>) -> Self { Self { client, watch_ns } }

    pub fn client(&self) -> &Client { &self.client }

    fn outputs_api(&self) -> Api<Output> {
        match self.watch_ns.as_deref() {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        }
    }
}

#[async_trait]
impl OutputSource for KubeHub {
    async fn list_outputs(&self) -> Result<Vec<Output>> {
        let list = self.outputs_api().list(&ListParams::default()).await.context("listing outputs")?;
        debug!(count = list.items.len(), "outputs listed");
        Ok(list.items)
    }
}

#[async_trait]
impl SecretStore for KubeHub {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<BTreeMap<String, String>> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await.with_context(|| format!("getting secret {}/{}", namespace, name))?;
        Ok(decode_secret(&secret))
    }
}

#[async_trait]
impl ConfigSink for KubeHub {
    async fn ensure_config(&self, target: &ConfigTarget, content: &[u8]) -> Result<()> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), &target.namespace);
        let cm = config_map(target, content);
        // Apply creates the object when absent and overwrites our fields when present.
        let pp = PatchParams::apply(FIELD_MANAGER).force();
        let obj = api
            .patch(&target.name, &pp, &Patch::Apply(&cm))
            .await
            .with_context(|| format!("applying configmap {}/{}", target.namespace, target.name))?;
        debug!(target = %target, rv = ?obj.metadata.resource_version, bytes = content.len(), "configmap applied");
        Ok(())
    }
}

/// `data` wins over `stringData`; values are decoded lossily as UTF-8.
pub fn decode_secret(secret: &Secret) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = secret.string_data.clone().unwrap_or_default();
    if let Some(data) = &secret.data {
        for (k, v) in data {
            out.insert(k.clone(), String::from_utf8_lossy(&v.0).into_owned());
        }
    }
    out
}

/// The desired ConfigMap: target labels plus the document under the target key.
pub fn config_map(target: &ConfigTarget, content: &[u8]) -> ConfigMap {
    let mut binary = BTreeMap::new();
    binary.insert(target.key.clone(), ByteString(content.to_vec()));
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            labels: Some(target.labels.clone()),
            ..Default::default()
        },
        binary_data: Some(binary),
        ..Default::default()
    }
}

fn trigger_from(obj: &Output, deleted: bool) -> Trigger {
    let namespace = obj.namespace();
    let name = obj.name_any();
    if deleted { Trigger::Deleted { namespace, name } } else { Trigger::Applied { namespace, name } }
}

/// List+watch Outputs and forward one trigger per change. Returns when the
/// stream ends or the receiver is gone.
pub async fn start_output_watcher(client: Client, namespace: Option<&str>, tx: mpsc::Sender<Trigger>) -> Result<()> {
    let api: Api<Output> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };
    let stream = watcher::watcher(api, watcher::Config::default()).default_backoff();
    futures::pin_mut!(stream);
    info!(ns = ?namespace, "output watcher started");
    while let Some(item) = stream.next().await {
        let ev = match item {
            Ok(ev) => ev,
            Err(e) => {
                warn!(error = %e, "output watch error; backing off");
                continue;
            }
        };
        let trig = match ev {
            Event::Applied(o) => trigger_from(&o, false),
            Event::Deleted(o) => trigger_from(&o, true),
            Event::Restarted(list) => {
                // A relist: rebuild from scratch once rather than per item.
                debug!(count = list.len(), "watch restart");
                Trigger::Resync
            }
        };
        if tx.send(trig).await.is_err() {
            debug!("trigger receiver closed; stopping watcher");
            return Ok(());
        }
    }
    warn!("output watcher stream ended");
    Ok(())
}

/// CustomResourceDefinition manifest of `Output`, as YAML.
pub fn crd_yaml() -> Result<String> {
    use kube::CustomResourceExt;
    serde_yaml::to_string(&Output::crd()).context("serializing Output CRD")
}
