//! Fluo render: turns `Output` records into one fluentd configuration document.
//!
//! - [`secret`]: secret references resolved through a per-output cache
//! - [`backend`]: type name → pure parameter renderer
//! - [`output`]: validation and parameter assembly for one record
//! - [`stanza`]: fixed `<system>`/`<source>` stanzas and `<match>` blocks
//! - [`assemble`]: the whole document

#![forbid(unsafe_code)]

pub mod assemble;
pub mod backend;
pub mod output;
pub mod secret;
pub mod stanza;

pub use assemble::{Assembler, ConfigDocument};
pub use backend::{Backend, BackendError, Registry};
pub use output::OutputRenderer;
pub use secret::{resolve, ParamCache};
pub use stanza::ConfigFragment;
