#![forbid(unsafe_code)]

use std::sync::Arc;

use fluo_core::memory::MemorySecrets;
use fluo_core::{OperatorConfig, Output, Param, SecretRef};
use fluo_render::Assembler;

fn block_of<'a>(doc: &'a str, marker: &str) -> &'a str {
    let at = doc.find(marker).expect("marker present");
    let start = doc[..at].rfind("<match").expect("block start");
    let end = at + doc[at..].find("</match>").expect("block end");
    &doc[start..end]
}

/// Lines of one block, sorted, so comparisons ignore key order.
fn lines(block: &str) -> Vec<String> {
    let mut v: Vec<String> = block.lines().skip(1).map(|l| l.trim().to_string()).collect();
    v.sort();
    v
}

#[tokio::test]
async fn es_objstore_end_to_end() {
    let out = Output::namespaced(
        "logging",
        "es-objstore",
        "elasticsearch",
        vec![Param::literal("url", "http://elasticsearch.logging.svc.cluster.local:9200")],
    );
    let asm = Assembler::new(Arc::new(OperatorConfig::default()));
    let doc = asm.assemble(&[out], &MemorySecrets::new()).await.unwrap();
    let block = block_of(doc.as_str(), "@type elasticsearch");
    assert!(block.starts_with("<match kube.**>"), "{}", block);
    let got = lines(block);
    for want in [
        "@type elasticsearch",
        "host elasticsearch.logging.svc.cluster.local",
        "port 9200",
        "scheme http",
        "index_name fluentd-es-objstore",
    ] {
        assert!(got.iter().any(|l| l == want), "missing {:?} in {:?}", want, got);
    }
    assert!(!got.iter().any(|l| l.starts_with("url ")));
}

#[tokio::test]
async fn assembling_twice_is_idempotent() {
    let secrets = MemorySecrets::new()
        .with("logging", "aws", [("key_id", "AKIA"), ("secret", "s3cr3t")])
        .with("logging", "loki", [("labels", "{\"cluster\":\"dev\"}")]);
    let outputs = vec![
        Output::namespaced(
            "logging",
            "archive",
            "S3",
            vec![
                Param::from_secret("aws_key_id", SecretRef::new("logging", "aws", "key_id")),
                Param::from_secret("aws_sec_key", SecretRef::new("logging", "aws", "secret")),
                Param::literal("s3_bucket", "logs"),
                Param::literal("s3_region", "us-west-2"),
            ],
        ),
        Output::namespaced(
            "logging",
            "grafana",
            "loki",
            vec![
                Param::literal("url", "http://loki:3100"),
                Param::from_secret("extra_labels", SecretRef::new("", "loki", "labels")),
            ],
        ),
        Output::namespaced("logging", "debug", "stdout", vec![]),
    ];
    let asm = Assembler::new(Arc::new(OperatorConfig::default()));
    let first = asm.assemble(&outputs, &secrets).await.unwrap();
    let second = asm.assemble(&outputs, &secrets).await.unwrap();
    for marker in ["@type s3", "@type loki", "@type stdout"] {
        assert_eq!(lines(block_of(first.as_str(), marker)), lines(block_of(second.as_str(), marker)));
    }
    // one fetch per secret per pass, secrets are not remembered across passes
    assert_eq!(secrets.fetches(), 4);
    let s3 = lines(block_of(first.as_str(), "@type s3"));
    assert!(s3.iter().any(|l| l == "aws_sec_key s3cr3t"));
}

#[tokio::test]
async fn unknown_secret_fails_the_whole_document() {
    let outputs = vec![
        Output::namespaced("logging", "debug", "stdout", vec![]),
        Output::namespaced(
            "logging",
            "es",
            "elasticsearch",
            vec![Param::from_secret("password", SecretRef::new("logging", "missing", "pw"))],
        ),
    ];
    let asm = Assembler::new(Arc::new(OperatorConfig::default()));
    let err = asm.assemble(&outputs, &MemorySecrets::new()).await.unwrap_err();
    assert!(err.to_string().contains("logging/missing"), "{}", err);
}
