//! Backend renderers: one pure `(params) -> params'` function per output type,
//! registered once in a [`Registry`].

use std::collections::BTreeMap;

use fluo_core::ParamMap;
use url::Url;

/// Key carrying the backend marker in every rendered block.
pub const TYPE_KEY: &str = "@type";

/// Mandatory s3 parameters when the bucket is reached through an instance role.
pub const S3_MANDATORY_PARAMS: &[&str] = &["s3_bucket", "s3_region"];
/// Mandatory s3 parameters when static credentials are required.
pub const S3_STATIC_CREDENTIALS_PARAMS: &[&str] = &["aws_key_id", "aws_sec_key", "s3_bucket", "s3_region"];
pub const LOKI_MANDATORY_PARAMS: &[&str] = &["url", "extra_labels"];

pub const ES_DEFAULT_HOST: &str = "elasticsearch";
pub const ES_DEFAULT_PORT: &str = "9200";
pub const ES_DEFAULT_SCHEME: &str = "http";

/// Inputs a backend may derive values from besides the params themselves.
#[derive(Debug, Clone, Copy)]
pub struct BackendCtx<'a> {
    pub output_name: &'a str,
    pub index_prefix: &'a str,
    pub s3_mandatory: &'static [&'static str],
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    Missing(&'static str),
    Invalid { param: String, reason: String },
}

pub type RenderFn = fn(&BackendCtx<'_>, ParamMap) -> Result<ParamMap, BackendError>;

#[derive(Debug, Clone, Copy)]
pub struct Backend {
    pub name: &'static str,
    /// Whether the output's declared params are resolved and passed in.
    pub takes_params: bool,
    pub render: RenderFn,
}

/// Type name (lower case) → backend.
#[derive(Debug, Clone)]
pub struct Registry {
    table: BTreeMap<&'static str, Backend>,
}

impl Registry {
    pub fn empty() -> Self { Self { table: BTreeMap::new() } }

    /// The supported backends: stdout, elasticsearch, s3, loki, ender.
    pub fn builtin() -> Self {
        let mut r = Self::empty();
        r.register(Backend { name: "stdout", takes_params: false, render: stdout });
        r.register(Backend { name: "elasticsearch", takes_params: true, render: elasticsearch });
        r.register(Backend { name: "s3", takes_params: true, render: s3 });
        r.register(Backend { name: "loki", takes_params: true, render: loki });
        r.register(Backend { name: "ender", takes_params: false, render: ender });
        r
    }

    pub fn register(&mut self, backend: Backend) { self.table.insert(backend.name, backend); }

    /// Lookup by already lower-cased type name.
    pub fn get(&self, name: &str) -> Option<&Backend> { self.table.get(name) }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ { self.table.keys().copied() }
}

impl Default for Registry {
    fn default() -> Self { Self::builtin() }
}

fn require(params: &ParamMap, mandatory: &'static [&'static str]) -> Result<(), BackendError> {
    match mandatory.iter().find(|p| !params.contains_key(**p)) {
        Some(missing) => Err(BackendError::Missing(*missing)),
        None => Ok(()),
    }
}

fn marker(mut params: ParamMap, ty: &str) -> ParamMap {
    params.insert(TYPE_KEY.to_string(), ty.to_string());
    params
}

pub fn stdout(_ctx: &BackendCtx<'_>, params: ParamMap) -> Result<ParamMap, BackendError> {
    Ok(marker(params, "stdout"))
}

/// Discard sink.
pub fn ender(_ctx: &BackendCtx<'_>, params: ParamMap) -> Result<ParamMap, BackendError> {
    Ok(marker(params, "null"))
}

pub fn elasticsearch(ctx: &BackendCtx<'_>, params: ParamMap) -> Result<ParamMap, BackendError> {
    let mut params = marker(params, "elasticsearch");
    params
        .entry("index_name".to_string())
        .or_insert_with(|| format!("{}-{}", ctx.index_prefix, ctx.output_name));

    match params.remove("url") {
        Some(raw) => {
            let u = Url::parse(&raw).map_err(|e| BackendError::Invalid { param: "url".into(), reason: e.to_string() })?;
            let host = u
                .host_str()
                .filter(|h| !h.is_empty())
                .ok_or_else(|| BackendError::Invalid { param: "url".into(), reason: format!("no host in '{}'", raw) })?;
            params.insert("host".into(), host.to_string());
            if let Some(port) = u.port_or_known_default() {
                params.insert("port".into(), port.to_string());
            }
            params.insert("scheme".into(), u.scheme().to_string());
        }
        None => {
            params.insert("host".into(), ES_DEFAULT_HOST.into());
            params.insert("port".into(), ES_DEFAULT_PORT.into());
            params.insert("scheme".into(), ES_DEFAULT_SCHEME.into());
        }
    }
    Ok(params)
}

pub fn s3(ctx: &BackendCtx<'_>, params: ParamMap) -> Result<ParamMap, BackendError> {
    require(&params, ctx.s3_mandatory)?;
    Ok(marker(params, "s3"))
}

pub fn loki(_ctx: &BackendCtx<'_>, params: ParamMap) -> Result<ParamMap, BackendError> {
    require(&params, LOKI_MANDATORY_PARAMS)?;
    Ok(marker(params, "loki"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CTX: BackendCtx<'static> =
        BackendCtx { output_name: "es-objstore", index_prefix: "fluentd", s3_mandatory: S3_MANDATORY_PARAMS };

    fn params(kv: &[(&str, &str)]) -> ParamMap {
        kv.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn elasticsearch_defaults_without_url() {
        let p = elasticsearch(&CTX, ParamMap::new()).unwrap();
        assert_eq!(p["@type"], "elasticsearch");
        assert_eq!(p["host"], "elasticsearch");
        assert_eq!(p["port"], "9200");
        assert_eq!(p["scheme"], "http");
        assert_eq!(p["index_name"], "fluentd-es-objstore");
    }

    #[test]
    fn elasticsearch_url_is_split_and_removed() {
        let p = elasticsearch(&CTX, params(&[("url", "http://es.example.com:9201")])).unwrap();
        assert_eq!(p["host"], "es.example.com");
        assert_eq!(p["port"], "9201");
        assert_eq!(p["scheme"], "http");
        assert!(!p.contains_key("url"));
    }

    #[test]
    fn elasticsearch_url_without_port_uses_scheme_default() {
        let p = elasticsearch(&CTX, params(&[("url", "https://es.example.com")])).unwrap();
        assert_eq!(p["port"], "443");
        assert_eq!(p["scheme"], "https");
    }

    #[test]
    fn elasticsearch_keeps_explicit_index_name() {
        let p = elasticsearch(&CTX, params(&[("index_name", "audit")])).unwrap();
        assert_eq!(p["index_name"], "audit");
    }

    #[test]
    fn elasticsearch_rejects_garbage_url() {
        let err = elasticsearch(&CTX, params(&[("url", "not a url")])).unwrap_err();
        assert!(matches!(err, BackendError::Invalid { ref param, .. } if param == "url"));
    }

    #[test]
    fn s3_requires_bucket_and_region() {
        assert_eq!(s3(&CTX, params(&[("s3_region", "us-east-1")])).unwrap_err(), BackendError::Missing("s3_bucket"));
        let p = s3(&CTX, params(&[("s3_bucket", "logs"), ("s3_region", "us-east-1")])).unwrap();
        assert_eq!(p["@type"], "s3");
    }

    #[test]
    fn s3_static_credentials_profile() {
        let ctx = BackendCtx { s3_mandatory: S3_STATIC_CREDENTIALS_PARAMS, ..CTX };
        let err = s3(&ctx, params(&[("s3_bucket", "logs"), ("s3_region", "us-east-1")])).unwrap_err();
        assert_eq!(err, BackendError::Missing("aws_key_id"));
    }

    #[test]
    fn loki_requires_url_and_labels() {
        assert_eq!(loki(&CTX, params(&[("url", "http://loki:3100")])).unwrap_err(), BackendError::Missing("extra_labels"));
        assert!(loki(&CTX, params(&[("url", "http://loki:3100"), ("extra_labels", "{\"env\":\"dev\"}")])).is_ok());
    }

    #[test]
    fn registry_holds_exactly_the_supported_types() {
        let r = Registry::builtin();
        let names: Vec<_> = r.names().collect();
        assert_eq!(names, vec!["elasticsearch", "ender", "loki", "s3", "stdout"]);
        assert!(r.get("kafka").is_none());
        assert!(!r.get("stdout").unwrap().takes_params);
    }
}
