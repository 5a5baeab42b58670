//! Secret resolution with a per-output memo.

use fluo_core::{FluoError, Result, SecretRef, SecretStore};
use metrics::counter;
use rustc_hash::FxHashMap;
use tracing::debug;

/// Resolved secret values for one output render pass, keyed `namespace/name/key`
/// (none of the three may contain a `/`, so keys never collide).
/// Never shared across outputs or cycles, so secrets are re-read on every reconcile.
#[derive(Debug, Default)]
pub struct ParamCache {
    map: FxHashMap<String, String>,
}

impl ParamCache {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, r: &SecretRef) -> Option<&str> {
        self.map.get(&cache_key(&r.namespace, &r.name, &r.key)).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.map.len() }
    pub fn is_empty(&self) -> bool { self.map.is_empty() }
}

fn cache_key(namespace: &str, name: &str, key: &str) -> String {
    format!("{}/{}/{}", namespace, name, key)
}

/// Resolve `r`, fetching its secret at most once per cache: the first fetch
/// stores every key of the secret.
pub async fn resolve(store: &dyn SecretStore, r: &SecretRef, cache: &mut ParamCache) -> Result<String> {
    if let Some(v) = cache.get(r) {
        return Ok(v.to_string());
    }
    counter!("fluo_secret_fetch_total", 1u64);
    let data = store.get_secret(&r.namespace, &r.name).await.map_err(|source| FluoError::SecretFetch {
        namespace: r.namespace.clone(),
        name: r.name.clone(),
        source,
    })?;
    debug!(secret = %format!("{}/{}", r.namespace, r.name), keys = data.len(), "secret fetched");
    for (k, v) in data {
        cache.map.insert(cache_key(&r.namespace, &r.name, &k), v);
    }
    cache.get(r).map(str::to_string).ok_or_else(|| FluoError::SecretKeyNotFound {
        namespace: r.namespace.clone(),
        name: r.name.clone(),
        key: r.key.clone(),
    })
}
