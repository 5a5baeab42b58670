use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use fluo_core::config::{
    default_labels, DEFAULT_CONFIG_KEY, DEFAULT_CONFIG_MAP, DEFAULT_FORWARD_PORT, DEFAULT_INDEX_PREFIX,
    DEFAULT_MATCH_PATTERN, DEFAULT_NAMESPACE, DEFAULT_RELOAD_HOST, DEFAULT_RELOAD_PORT, DEFAULT_RELOAD_TIMEOUT_MS,
    DEFAULT_RESYNC_SECS,
};
use fluo_core::{OperatorConfig, OutputSource};
use fluo_kubehub::{manifest::parse_manifests, KubeHub};
use fluo_reconcile::{spawn_controller, Collaborators, HttpReloader, Reconciler};
use fluo_render::Assembler;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "fluoctl", version, about = "Render Output resources into fluentd configuration")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long = "log-json", global = true, action = ArgAction::SetTrue)]
    log_json: bool,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone)]
struct ConfigArgs {
    /// Namespace of the forwarder and its configuration object
    #[arg(long, env = "FLUO_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,
    #[arg(long, env = "FLUO_CONFIG_MAP", default_value = DEFAULT_CONFIG_MAP)]
    config_map: String,
    #[arg(long, env = "FLUO_CONFIG_KEY", default_value = DEFAULT_CONFIG_KEY)]
    config_key: String,
    /// Labels stamped on the configuration object (k=v, repeatable); defaults to the operator set
    #[arg(long = "label", env = "FLUO_LABELS", value_delimiter = ',', value_parser = parse_label)]
    labels: Vec<(String, String)>,
    #[arg(long, env = "FLUO_FORWARD_PORT", default_value_t = DEFAULT_FORWARD_PORT)]
    forward_port: u16,
    #[arg(long, env = "FLUO_RELOAD_HOST", default_value = DEFAULT_RELOAD_HOST)]
    reload_host: String,
    #[arg(long, env = "FLUO_RELOAD_PORT", default_value_t = DEFAULT_RELOAD_PORT)]
    reload_port: u16,
    #[arg(long, env = "FLUO_RELOAD_TIMEOUT_MS", default_value_t = DEFAULT_RELOAD_TIMEOUT_MS)]
    reload_timeout_ms: u64,
    /// Seconds between full rebuilds. Each one republishes the configuration object;
    /// the forwarder is only reloaded when the document changed
    #[arg(long, env = "FLUO_RESYNC_SECS", default_value_t = DEFAULT_RESYNC_SECS)]
    resync_secs: u64,
    /// Prefix of the default elasticsearch index_name, rendered as <prefix>-<output name>
    #[arg(long, env = "FLUO_INDEX_PREFIX", default_value = DEFAULT_INDEX_PREFIX)]
    index_prefix: String,
    #[arg(long, env = "FLUO_MATCH_PATTERN", default_value = DEFAULT_MATCH_PATTERN)]
    match_pattern: String,
    /// Require aws_key_id/aws_sec_key on s3 outputs, in addition to s3_bucket/s3_region
    #[arg(long, env = "FLUO_S3_STATIC_CREDENTIALS", action = ArgAction::SetTrue)]
    s3_static_credentials: bool,
}

impl ConfigArgs {
    fn into_config(self) -> OperatorConfig {
        let labels = if self.labels.is_empty() { default_labels() } else { self.labels.into_iter().collect() };
        OperatorConfig {
            namespace: self.namespace,
            config_map: self.config_map,
            config_key: self.config_key,
            labels,
            forward_port: self.forward_port,
            reload_host: self.reload_host,
            reload_port: self.reload_port,
            reload_timeout_ms: self.reload_timeout_ms,
            resync_secs: self.resync_secs,
            index_prefix: self.index_prefix,
            match_pattern: self.match_pattern,
            s3_require_static_credentials: self.s3_static_credentials,
        }
    }
}

fn parse_label(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
        _ => Err(format!("expected key=value, got {:?}", s)),
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch Outputs and keep the forwarder configuration in sync
    Run {
        /// Only watch Outputs in this namespace (default: all namespaces)
        #[arg(long = "watch-ns", env = "FLUO_WATCH_NAMESPACE")]
        watch_ns: Option<String>,
    },
    /// Render the configuration document once and print it
    Render {
        /// Multi-document YAML with Output and Secret records, instead of the cluster
        #[arg(long = "file", short = 'f')]
        file: Option<std::path::PathBuf>,
        /// Only read Outputs from this namespace (default: all namespaces)
        #[arg(long = "watch-ns", env = "FLUO_WATCH_NAMESPACE")]
        watch_ns: Option<String>,
    },
    /// Print the Output CustomResourceDefinition
    Crd,
}

fn init_tracing(json: bool) {
    let env = std::env::var("FLUO_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).with_target(true).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
    }
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("FLUO_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid FLUO_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);
    let cfg = cli.config.into_config();

    match cli.command {
        Commands::Run { watch_ns } => {
            init_metrics();
            run(cfg, watch_ns).await
        }
        Commands::Render { file, watch_ns } => {
            let doc = match file {
                Some(path) => {
                    let text = std::fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
                    let default_ns = watch_ns.unwrap_or_else(|| cfg.namespace.clone());
                    let m = parse_manifests(&text, &default_ns)?;
                    info!(outputs = m.outputs.len(), secrets = m.secrets.len(), "loaded manifests");
                    Assembler::new(Arc::new(cfg)).assemble(&m.outputs, &m.secrets).await?
                }
                None => {
                    let hub = KubeHub::new(fluo_kubehub::get_kube_client().await?, watch_ns);
                    let outputs = hub.list_outputs().await?;
                    Assembler::new(Arc::new(cfg)).assemble(&outputs, &hub).await?
                }
            };
            print!("{}", doc);
            Ok(())
        }
        Commands::Crd => {
            print!("{}", fluo_kubehub::crd_yaml()?);
            Ok(())
        }
    }
}

async fn run(cfg: OperatorConfig, watch_ns: Option<String>) -> Result<()> {
    let cfg = Arc::new(cfg);
    let client = fluo_kubehub::get_kube_client().await?;
    let hub = Arc::new(KubeHub::new(client.clone(), watch_ns.clone()));
    let notifier = Arc::new(HttpReloader::from_config(&cfg)?);
    info!(reload = %notifier.url(), target = %cfg.config_target(), watch_ns = ?watch_ns, "starting controller");
    let deps = Collaborators { outputs: hub.clone(), secrets: hub.clone(), sink: hub, notifier };
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&cfg), deps));

    let cap = std::env::var("FLUO_QUEUE_CAP").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(256);
    let (tx, rx) = mpsc::channel(cap);
    let mut watcher = tokio::spawn(async move {
        if let Err(e) = fluo_kubehub::start_output_watcher(client, watch_ns.as_deref(), tx).await {
            error!(error = ?e, "output watcher failed");
        }
    });
    let controller = spawn_controller(reconciler, rx, cfg.resync_period());

    let outcome = tokio::select! {
        res = signal::ctrl_c() => {
            res.context("listening for ctrl-c")?;
            info!("shutdown requested");
            Ok(())
        }
        res = &mut watcher => Err(anyhow!("output watcher exited: {:?}", res)),
    };
    // dropping the watcher closes the trigger channel, which stops the controller
    if !watcher.is_finished() {
        watcher.abort();
        let _ = watcher.await;
    }
    match tokio::time::timeout(Duration::from_secs(10), controller).await {
        Ok(Ok(())) => info!("controller stopped"),
        Ok(Err(e)) => error!(error = %e, "controller task panicked"),
        Err(_) => warn!("controller did not stop within 10s"),
    }
    outcome
}
