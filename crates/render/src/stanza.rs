//! Rendered configuration blocks and the fixed stanzas every document carries.

use std::fmt::Write as _;

use fluo_core::ParamMap;

use crate::backend::TYPE_KEY;

const INDENT: &str = "    ";

/// One rendered stanza. Immutable once built; documents are made by concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFragment(String);

impl ConfigFragment {
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn as_bytes(&self) -> &[u8] { self.0.as_bytes() }
    pub fn into_string(self) -> String { self.0 }
}

impl std::fmt::Display for ConfigFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { f.write_str(&self.0) }
}

/// `<tag args>` + one indented line per entry + `</tag>`.
fn block<'a>(open: &str, close: &str, lines: impl IntoIterator<Item = (&'a str, &'a str)>) -> ConfigFragment {
    let mut s = String::new();
    s.push('<');
    s.push_str(open);
    s.push('>');
    for (k, v) in lines {
        // writing into a String cannot fail
        let _ = write!(s, "\n{}{} {}", INDENT, k, v);
    }
    let _ = write!(s, "\n</{}>", close);
    ConfigFragment(s)
}

/// Reload RPC endpoint on all interfaces.
pub fn system(reload_port: u16) -> ConfigFragment {
    let endpoint = format!("0.0.0.0:{}", reload_port);
    block("system", "system", [("rpc_endpoint", endpoint.as_str())])
}

/// Forward-protocol listener the shippers send to.
pub fn source(forward_port: u16) -> ConfigFragment {
    let port = forward_port.to_string();
    block("source", "source", [("@type", "forward"), ("port", port.as_str()), ("bind", "0.0.0.0")])
}

/// `<match pattern>` block: `@type` first, then the remaining parameters in key order.
pub fn match_block(pattern: &str, params: &ParamMap) -> ConfigFragment {
    let ty = params.get_key_value(TYPE_KEY);
    let rest = params.iter().filter(|(k, _)| k.as_str() != TYPE_KEY);
    block(&format!("match {}", pattern), "match", ty.into_iter().chain(rest).map(|(k, v)| (k.as_str(), v.as_str())))
}

/// Drops every event no output claimed.
pub fn catch_all() -> ConfigFragment {
    block("match **", "match", [("@type", "null")])
}
