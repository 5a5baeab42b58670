//! Assembles the full forwarder configuration document.

use std::sync::Arc;

use fluo_core::{OperatorConfig, Output, Result, SecretStore};
use tracing::debug;

use crate::output::OutputRenderer;
use crate::stanza::{self, ConfigFragment};

/// The complete document. Replaces whatever was published before; no diffing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDocument(String);

impl ConfigDocument {
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}

impl std::fmt::Display for ConfigDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

pub struct Assembler {
    cfg: Arc<OperatorConfig>,
    renderer: OutputRenderer,
}

impl Assembler {
    pub fn new(cfg: Arc<OperatorConfig>) -> Self {
        let renderer = OutputRenderer::new(Arc::clone(&cfg));
        Self { cfg, renderer }
    }

    pub fn with_renderer(cfg: Arc<OperatorConfig>, renderer: OutputRenderer) -> Self { Self { cfg, renderer } }

    pub fn renderer(&self) -> &OutputRenderer { &self.renderer }

    /// System, source, one block per output in the given order, then the global
    /// catch-all. Any output failing to render fails the whole document.
    pub async fn assemble(&self, outputs: &[Output], secrets: &dyn SecretStore) -> Result<ConfigDocument> {
        let mut fragments = Vec::with_capacity(outputs.len() + 3);
        fragments.push(stanza::system(self.cfg.reload_port));
        fragments.push(stanza::source(self.cfg.forward_port));
        for out in outputs {
            fragments.push(self.renderer.render(out, secrets).await?);
        }
        if !outputs.is_empty() {
            fragments.push(stanza::catch_all());
        }
        let doc = join(&fragments);
        debug!(outputs = outputs.len(), bytes = doc.len(), "configuration assembled");
        Ok(doc)
    }
}

/// Blank line between stanzas; the document ends with a newline.
fn join(fragments: &[ConfigFragment]) -> ConfigDocument {
    let mut s = fragments.iter().map(ConfigFragment::as_str).collect::<Vec<_>>().join("\n\n");
    s.push('\n');
    ConfigDocument(s)
}
