//! In-memory collaborators: offline rendering from manifests, and tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;

use crate::{ConfigSink, ConfigTarget, Output, OutputSource, SecretStore};

/// Secrets keyed by (namespace, name). Counts remote-equivalent fetches.
#[derive(Debug, Default)]
pub struct MemorySecrets {
    secrets: BTreeMap<(String, String), BTreeMap<String, String>>,
    fetches: AtomicUsize,
}

impl MemorySecrets {
    pub fn new() -> Self { Self::default() }

    pub fn insert<K, V>(&mut self, namespace: &str, name: &str, data: impl IntoIterator<Item = (K, V)>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        let data = data.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        self.secrets.insert((namespace.to_string(), name.to_string()), data);
    }

    pub fn with<K, V>(mut self, namespace: &str, name: &str, data: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.insert(namespace, name, data);
        self
    }

    /// Number of `get_secret` calls served so far.
    pub fn fetches(&self) -> usize { self.fetches.load(Ordering::SeqCst) }

    pub fn len(&self) -> usize { self.secrets.len() }
    pub fn is_empty(&self) -> bool { self.secrets.is_empty() }
}

#[async_trait]
impl SecretStore for MemorySecrets {
    async fn get_secret(&self, namespace: &str, name: &str) -> anyhow::Result<BTreeMap<String, String>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| anyhow!("secrets \"{}\" not found in namespace {}", name, namespace))
    }
}

/// A fixed (replaceable) list of `Output` records.
#[derive(Debug, Default)]
pub struct MemoryOutputs {
    items: Mutex<Vec<Output>>,
}

impl MemoryOutputs {
    pub fn new(items: Vec<Output>) -> Self { Self { items: Mutex::new(items) } }

    pub fn replace(&self, items: Vec<Output>) {
        if let Ok(mut guard) = self.items.lock() { *guard = items; }
    }
}

#[async_trait]
impl OutputSource for MemoryOutputs {
    async fn list_outputs(&self) -> anyhow::Result<Vec<Output>> {
        let guard = self.items.lock().map_err(|_| anyhow!("output list lock poisoned"))?;
        Ok(guard.clone())
    }
}

/// Records every publish; the last entry is the "live" object.
#[derive(Debug, Default)]
pub struct MemorySink {
    published: Mutex<Vec<(ConfigTarget, Vec<u8>)>>,
}

impl MemorySink {
    pub fn new() -> Self { Self::default() }

    pub fn publishes(&self) -> usize { self.published.lock().map(|g| g.len()).unwrap_or(0) }

    pub fn last(&self) -> Option<(ConfigTarget, Vec<u8>)> {
        self.published.lock().ok().and_then(|g| g.last().cloned())
    }
}

#[async_trait]
impl ConfigSink for MemorySink {
    async fn ensure_config(&self, target: &ConfigTarget, content: &[u8]) -> anyhow::Result<()> {
        let mut guard = self.published.lock().map_err(|_| anyhow!("sink lock poisoned"))?;
        guard.push((target.clone(), content.to_vec()));
        Ok(())
    }
}
