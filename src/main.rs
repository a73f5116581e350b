use std::sync::Arc;
use std::time::Duration;

use app_operator::{
    controller::{self, ControllerConfig, KubeStore},
    crd::Application,
    Error,
};
use clap::{Parser, Subcommand, ValueEnum};
use kube::CustomResourceExt;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version and build information
    Version,
    /// Print the Application CRD as YAML
    Crd,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Namespace to watch (all namespaces when empty)
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Upper bound for each Kubernetes API call, in seconds
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30)]
    api_timeout_secs: u64,

    /// Requeue delay after a retriable reconcile error, in seconds
    #[arg(long, env = "RETRY_SECS", default_value_t = 15)]
    retry_secs: u64,

    /// Requeue delay after an error that needs user action, in seconds
    #[arg(long, env = "FATAL_RETRY_SECS", default_value_t = 300)]
    fatal_retry_secs: u64,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Port for the health and metrics server
    #[arg(long, env = "HTTP_PORT", default_value_t = 8080)]
    http_port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("Application Operator v{}", env!("CARGO_PKG_VERSION"));
            println!("Build Date: {}", env!("BUILD_DATE"));
            Ok(())
        }
        Commands::Crd => {
            print!("{}", serde_yaml::to_string(&Application::crd())?);
            Ok(())
        }
        Commands::Run(run_args) => Ok(run_operator(run_args).await?),
    }
}

fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    init_tracing(args.log_format);

    info!(
        "Starting Application Operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;

    info!("Connected to Kubernetes cluster");

    let config = ControllerConfig {
        namespace: Some(args.namespace.clone()).filter(|ns| !ns.is_empty()),
        retry_interval: Duration::from_secs(args.retry_secs),
        fatal_retry_interval: Duration::from_secs(args.fatal_retry_secs),
    };

    let state = Arc::new(controller::ControllerState {
        client: client.clone(),
        store: KubeStore::new(client, Duration::from_secs(args.api_timeout_secs)),
        config,
    });

    #[cfg(feature = "rest-api")]
    {
        let port = args.http_port;
        tokio::spawn(async move {
            if let Err(e) = app_operator::rest_api::run_server(port).await {
                tracing::error!("HTTP server error: {:?}", e);
            }
        });
    }
    #[cfg(not(feature = "rest-api"))]
    let _ = args.http_port;

    controller::run_controller(state).await
}
