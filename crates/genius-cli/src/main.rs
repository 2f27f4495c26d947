//! `genius` command-line entry point.

mod config;

use clap::{Parser, Subcommand, ValueEnum};
use config::GeniusConfig;
use genius_gateway::GatewayServer;
use genius_supervisor::{
    AgentRegistry, FileWorkflowStore, HealthMonitor, HttpAgentClient, InMemoryWorkflowStore,
    SubmitRequest, SupervisorConfig, WorkflowCoordinator, WorkflowStatus, WorkflowStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genius", about = "Genius supervisor: repository documentation workflows")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "genius.toml")]
    config: PathBuf,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Pretty,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Host to bind to (overrides config)
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
        /// Persist workflow records under this directory instead of memory
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Probe every agent once and print the registry
    Agents,
    /// Run one workflow to completion and print the outcome
    Run {
        /// Repository URL
        url: String,
        /// Priority 1-10 (default from config)
        #[arg(long)]
        priority: Option<u8>,
        /// Give up waiting after this many seconds
        #[arg(long, default_value_t = 3600)]
        wait_secs: u64,
    },
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.compact().init(),
    }
}

/// Shared pieces every subcommand needs.
struct Runtime {
    registry: Arc<AgentRegistry>,
    client: Arc<HttpAgentClient>,
    monitor: Arc<HealthMonitor>,
}

impl Runtime {
    fn new(config: &SupervisorConfig) -> anyhow::Result<Self> {
        let registry = Arc::new(AgentRegistry::from_config(config));
        let client = Arc::new(HttpAgentClient::new(config.health.path.clone())?);
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            client.clone(),
            &config.health,
        ));
        Ok(Self {
            registry,
            client,
            monitor,
        })
    }

    fn coordinator(
        &self,
        config: SupervisorConfig,
        store: Arc<dyn WorkflowStore>,
    ) -> anyhow::Result<WorkflowCoordinator> {
        Ok(WorkflowCoordinator::new(
            config,
            self.registry.clone(),
            self.client.clone(),
            store,
        )?)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    init_tracing(cli.log_format);

    let config = GeniusConfig::load(&cli.config).await?;

    match cli.command {
        Commands::Serve {
            host,
            port,
            data_dir,
        } => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);

            let store: Arc<dyn WorkflowStore> = match data_dir {
                Some(dir) => {
                    info!(dir = %dir.display(), "Using file workflow store");
                    Arc::new(FileWorkflowStore::new(dir).await?)
                }
                None => Arc::new(InMemoryWorkflowStore::new()),
            };

            let runtime = Runtime::new(&config.supervisor)?;
            let coordinator = runtime.coordinator(config.supervisor, store)?;

            let shutdown = CancellationToken::new();
            let monitor = runtime.monitor.clone().spawn(shutdown.clone());

            let app = GatewayServer::build(coordinator);
            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            info!("Genius gateway listening on {addr}");

            let stop = shutdown.clone();
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        warn!(error = %e, "Failed to listen for ctrl-c");
                    }
                    info!("Shutting down");
                    stop.cancel();
                })
                .await?;

            shutdown.cancel();
            monitor.await?;
        }
        Commands::Agents => {
            let runtime = Runtime::new(&config.supervisor)?;
            runtime.monitor.probe_all().await;
            let agents = runtime.registry.snapshot().await;
            println!("{}", serde_json::to_string_pretty(&agents)?);
        }
        Commands::Run {
            url,
            priority,
            wait_secs,
        } => {
            let runtime = Runtime::new(&config.supervisor)?;
            // Mark agents reachable before the first phase is dispatched.
            runtime.monitor.probe_all().await;
            let shutdown = CancellationToken::new();
            let monitor = runtime.monitor.clone().spawn(shutdown.clone());

            let coordinator =
                runtime.coordinator(config.supervisor, Arc::new(InMemoryWorkflowStore::new()))?;
            let mut request = SubmitRequest::new(url);
            request.priority = priority;
            let receipt = coordinator.submit(request).await?;
            info!(workflow_id = %receipt.workflow_id, "Workflow submitted");

            let wf = coordinator
                .await_terminal(receipt.workflow_id, Duration::from_secs(wait_secs))
                .await?;
            shutdown.cancel();
            monitor.await?;

            match (&wf.status, &wf.result) {
                (WorkflowStatus::Completed, Some(result)) => {
                    println!("{}", serde_json::to_string_pretty(result)?);
                }
                _ => {
                    let failures: serde_json::Map<String, serde_json::Value> = wf
                        .phases
                        .iter()
                        .filter(|p| !p.error_history.is_empty())
                        .map(|p| (p.phase.to_string(), serde_json::json!(p.error_history)))
                        .collect();
                    let report = serde_json::json!({
                        "workflow_id": wf.id,
                        "status": wf.status,
                        "error": wf.error,
                        "failures": failures,
                    });
                    println!("{}", serde_json::to_string_pretty(&report)?);
                    anyhow::bail!("workflow {} ended as {}", wf.id, wf.status);
                }
            }
        }
    }

    Ok(())
}
