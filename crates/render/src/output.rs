//! Renders one `Output` record into its `<match>` block.

use std::sync::Arc;

use fluo_core::{FluoError, OperatorConfig, Output, ParamMap, Result, SecretRef, SecretStore};
use kube::ResourceExt;
use tracing::debug;

use crate::backend::{BackendCtx, BackendError, Registry, S3_MANDATORY_PARAMS, S3_STATIC_CREDENTIALS_PARAMS};
use crate::secret::{self, ParamCache};
use crate::stanza::{self, ConfigFragment};

pub struct OutputRenderer {
    cfg: Arc<OperatorConfig>,
    registry: Registry,
}

impl OutputRenderer {
    pub fn new(cfg: Arc<OperatorConfig>) -> Self { Self::with_registry(cfg, Registry::builtin()) }

    pub fn with_registry(cfg: Arc<OperatorConfig>, registry: Registry) -> Self { Self { cfg, registry } }

    pub fn registry(&self) -> &Registry { &self.registry }

    /// Validate `output`, resolve its params and render its block.
    pub async fn render(&self, output: &Output, secrets: &dyn SecretStore) -> Result<ConfigFragment> {
        let params = self.render_params(output, secrets).await?;
        Ok(stanza::match_block(&self.cfg.match_pattern, &params))
    }

    /// Final `key -> value` lines of `output`'s block.
    pub async fn render_params(&self, output: &Output, secrets: &dyn SecretStore) -> Result<ParamMap> {
        let key = output.key();
        let ty = output.spec.output_type.to_lowercase();
        let backend = self.registry.get(&ty).ok_or_else(|| FluoError::UnsupportedOutputType {
            output: key.clone(),
            output_type: output.spec.output_type.clone(),
        })?;

        let params = if backend.takes_params {
            let mut cache = ParamCache::new();
            collect_params(output, secrets, &mut cache).await?
        } else {
            ParamMap::new()
        };

        let name = output.name_any();
        let ctx = BackendCtx {
            output_name: &name,
            index_prefix: &self.cfg.index_prefix,
            s3_mandatory: if self.cfg.s3_require_static_credentials {
                S3_STATIC_CREDENTIALS_PARAMS
            } else {
                S3_MANDATORY_PARAMS
            },
        };
        let rendered = (backend.render)(&ctx, params).map_err(|e| match e {
            BackendError::Missing(param) => FluoError::MissingMandatoryParameter {
                output: key.clone(),
                backend: backend.name.to_string(),
                param: param.to_string(),
            },
            BackendError::Invalid { param, reason } => FluoError::InvalidParameter { output: key.clone(), param, reason },
        })?;
        debug!(output = %key, backend = backend.name, params = rendered.len(), "output rendered");
        Ok(rendered)
    }
}

/// Lower-cased name → literal value, or the resolved secret value when the literal is empty.
/// Later duplicates overwrite earlier ones. A value that ends up empty is an error.
async fn collect_params(output: &Output, secrets: &dyn SecretStore, cache: &mut ParamCache) -> Result<ParamMap> {
    let own_ns = output.namespace().unwrap_or_default();
    let mut params = ParamMap::new();
    for p in &output.spec.params {
        let name = p.name.to_lowercase();
        let value = if !p.value.is_empty() {
            p.value.clone()
        } else if let Some(vf) = &p.value_from {
            secret::resolve(secrets, &SecretRef::qualify(vf, &own_ns), cache).await?
        } else {
            String::new()
        };
        if value.is_empty() {
            return Err(FluoError::MissingParameterValue { output: output.key(), param: p.name.clone() });
        }
        params.insert(name, value);
    }
    Ok(params)
}
