//! appop CLI - Kubernetes operator turning Apps into Deployments and Services

use appop_kube::{ControllerConfig, parse_duration};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod error;
mod exit_codes;

use commands::render::OutputFormat;

#[derive(Parser)]
#[command(name = "appop")]
#[command(author = "appop Contributors")]
#[command(version)]
#[command(about = "Kubernetes operator reconciling Apps into Deployments and Services", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, global = true, env = "APPOP_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "APPOP_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the controller against the current cluster
    Run {
        /// Only watch Apps in this namespace
        #[arg(short, long, env = "APPOP_NAMESPACE")]
        namespace: Option<String>,

        /// Requeue delay after a retryable failure (e.g. 500ms, 5s, 1m)
        #[arg(long, env = "APPOP_RETRY_BACKOFF", default_value = "5s", value_parser = duration)]
        retry_backoff: Duration,

        /// Requeue delay after a failure that needs the App to change
        #[arg(long, env = "APPOP_FATAL_BACKOFF", default_value = "5m", value_parser = duration)]
        fatal_backoff: Duration,

        /// Requeue delay after a successful reconciliation
        #[arg(long, env = "APPOP_RESYNC_INTERVAL", default_value = "5m", value_parser = duration)]
        resync_interval: Duration,
    },

    /// Print the App CustomResourceDefinition
    Crd,

    /// Print the Deployment and Service built for an App manifest
    Render {
        /// App manifest
        app: PathBuf,

        /// Namespace to render into (defaults to the manifest's, then "default")
        #[arg(short, long)]
        namespace: Option<String>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "yaml")]
        output: OutputFormat,
    },

    /// Show the action the controller would take for each managed resource
    Diff {
        /// App manifest
        app: PathBuf,

        /// Multi-document YAML with the live Deployment and Service
        #[arg(long)]
        live: Option<PathBuf>,

        /// Namespace of the App (defaults to the manifest's, then "default")
        #[arg(short, long)]
        namespace: Option<String>,

        /// Output the plan as JSON
        #[arg(long)]
        json: bool,

        /// Exit with code 10 when any resource would change
        #[arg(long)]
        exit_code: bool,
    },
}

fn duration(value: &str) -> Result<Duration, String> {
    parse_duration(value).ok_or_else(|| format!("invalid duration '{}' (expected e.g. 500ms, 30s, 5m, 1h)", value))
}

fn init_tracing(level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    // Logs go to stderr so rendered manifests on stdout stay parseable
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn dispatch(command: Commands) -> error::Result<()> {
    match command {
        Commands::Run {
            namespace,
            retry_backoff,
            fatal_backoff,
            resync_interval,
        } => {
            commands::run::run(ControllerConfig {
                namespace,
                retry_backoff,
                fatal_backoff,
                resync_interval,
            })
            .await
        }

        Commands::Crd => commands::crd::run(),

        Commands::Render {
            app,
            namespace,
            output,
        } => commands::render::run(&app, namespace.as_deref(), output),

        Commands::Diff {
            app,
            live,
            namespace,
            json,
            exit_code,
        } => commands::diff::run(&app, live.as_deref(), namespace.as_deref(), json, exit_code),
    }
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.log_json);

    let code = match dispatch(cli.command).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(err) => {
            let code = err.exit_code();
            eprintln!("{:?}", miette::Report::new(err));
            code
        }
    };

    std::process::exit(code);
}
