use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tollgate::config::TollgateConfig;
use tollgate::http::{AppState, HttpServer};
use tollgate::identity::IdentityResolver;
use tollgate::ratelimit::{ConsistencyMode, FailurePolicy, WindowLimiter};
use tollgate::store::RedisStore;

/// Command line arguments. Every flag overrides the configuration file and
/// `TOLLGATE__*` variables.
#[derive(Parser, Debug)]
#[command(name = "tollgate", version)]
#[command(about = "Per-client fixed-window rate limiter backed by Redis")]
struct Args {
    /// YAML configuration file
    #[arg(short, long, env = "TOLLGATE_CONFIG")]
    config: Option<PathBuf>,

    /// Listen host
    #[arg(long, env = "HOST")]
    host: Option<IpAddr>,

    /// Listen port
    #[arg(short, long, env = "PORT")]
    port: Option<u16>,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Maximum requests per client per window
    #[arg(long, env = "REQUEST_LIMIT")]
    request_limit: Option<u64>,

    /// Window length in seconds
    #[arg(long, env = "TIME_WINDOW")]
    time_window: Option<u64>,

    /// read_then_write or atomic
    #[arg(long)]
    consistency: Option<ConsistencyMode>,

    /// error, allow or deny
    #[arg(long)]
    failure_policy: Option<FailurePolicy>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

impl Args {
    fn apply(&self, config: &mut TollgateConfig) {
        let listen = &mut config.server.listen_addr;
        if let Some(host) = self.host {
            *listen = SocketAddr::new(host, listen.port());
        }
        if let Some(port) = self.port {
            listen.set_port(port);
        }
        if let Some(url) = &self.redis_url {
            config.store.url = url.clone();
        }

        let rl = &mut config.rate_limiting;
        if let Some(limit) = self.request_limit {
            rl.request_limit = limit;
        }
        if let Some(window) = self.time_window {
            rl.time_window_secs = window;
        }
        if let Some(consistency) = self.consistency {
            rl.consistency = consistency;
        }
        if let Some(policy) = self.failure_policy {
            rl.failure_policy = policy;
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Tollgate rate limiting service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TollgateConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    info!(
        listen_addr = %config.server.listen_addr,
        request_limit = config.rate_limiting.request_limit,
        time_window_secs = config.rate_limiting.time_window_secs,
        consistency = ?config.rate_limiting.consistency,
        failure_policy = ?config.rate_limiting.failure_policy,
        "Configuration loaded"
    );

    let store = RedisStore::connect(&config.store.url).await?;
    let limiter = Arc::new(WindowLimiter::from_config(
        Arc::new(store),
        &config.rate_limiting,
        &config.store,
    ));
    let resolver = Arc::new(IdentityResolver::new(&config.identity));
    info!("Rate limiter initialized");

    HttpServer::new(config.server.listen_addr, AppState::new(limiter, resolver))
        .serve_with_shutdown(shutdown_signal())
        .await?;

    info!("Tollgate rate limiting service stopped");
    Ok(())
}

/// Resolves once the process is asked to stop (Ctrl+C, or SIGTERM on Unix).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use signal::unix::{signal as unix_signal, SignalKind};

        match unix_signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => info!("SIGTERM received, draining connections"),
                }
            }
            Err(err) => {
                warn!(error = %err, "Cannot listen for SIGTERM, stopping on Ctrl+C only");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Ctrl+C received, draining connections"),
        Err(err) => {
            // Without a handler the only way out is an external kill.
            warn!(error = %err, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
