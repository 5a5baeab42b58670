//! Error taxonomy of a reconciliation cycle.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FluoError {
    #[error("output {output}: unsupported output type '{output_type}'")]
    UnsupportedOutputType { output: String, output_type: String },

    #[error("output {output}: mandatory {backend} parameter '{param}' is missing")]
    MissingMandatoryParameter { output: String, backend: String, param: String },

    #[error("output {output}: parameter '{param}' is invalid: {reason}")]
    InvalidParameter { output: String, param: String, reason: String },

    #[error("output {output}: parameter '{param}' resolved to an empty value")]
    MissingParameterValue { output: String, param: String },

    #[error("fetching secret {namespace}/{name}: {source}")]
    SecretFetch {
        namespace: String,
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("key '{key}' was not found in secret {namespace}/{name}")]
    SecretKeyNotFound { namespace: String, name: String, key: String },

    #[error("listing Output records: {0}")]
    List(#[source] anyhow::Error),

    #[error("publishing configuration to {target}: {source}")]
    Publish {
        target: String,
        #[source]
        source: anyhow::Error,
    },

    /// Only ever logged; a failed reload never fails a cycle.
    #[error("reload notification failed: {0}")]
    ReloadNotify(String),
}

pub type Result<T> = std::result::Result<T, FluoError>;

impl FluoError {
    /// Collaborator failures that may clear up by themselves.
    /// The rest need an `Output` (or a Secret) to be fixed first.
    pub fn is_transient(&self) -> bool {
        matches!(self, FluoError::SecretFetch { .. } | FluoError::List(_) | FluoError::Publish { .. })
    }

    /// Whether the cycle that produced this error must be retried.
    pub fn is_fatal(&self) -> bool { !matches!(self, FluoError::ReloadNotify(_)) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_culprit() {
        let e = FluoError::MissingMandatoryParameter {
            output: "logging/archive".into(),
            backend: "s3".into(),
            param: "s3_bucket".into(),
        };
        let s = e.to_string();
        assert!(s.contains("s3_bucket"), "{}", s);
        assert!(s.contains("logging/archive"), "{}", s);

        let e = FluoError::SecretKeyNotFound { namespace: "ns".into(), name: "s".into(), key: "pw".into() };
        assert_eq!(e.to_string(), "key 'pw' was not found in secret ns/s");
    }

    #[test]
    fn reload_failures_are_not_fatal() {
        assert!(!FluoError::ReloadNotify("connection refused".into()).is_fatal());
        assert!(FluoError::List(anyhow::anyhow!("boom")).is_fatal());
        assert!(FluoError::List(anyhow::anyhow!("boom")).is_transient());
        let e = FluoError::UnsupportedOutputType { output: "a/b".into(), output_type: "kafka".into() };
        assert!(e.is_fatal());
        assert!(!e.is_transient());
    }
}
