mod commands;
mod config;

use clap::{Parser, Subcommand};
use commands::{CliError, Session, SelectArgs, SettingsArgs, TimetableArgs};
use config::{CommonConfig, Config};
use metrics_exporter_statsd::StatsdBuilder;
use schedule::client::ScheduleClient;
use schedule::state::FilesystemStateStore;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(version, about = "University class schedule viewer")]
struct Cli {
    /// YAML configuration file
    #[arg(long, global = true)]
    config_file_path: Option<PathBuf>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run the gateway
    Gateway,
    /// List the configured universities
    Tenants,
    /// Switch to another university
    UseTenant { tenant_id: String },
    /// Pick faculty, course, group and student
    Select(SelectArgs),
    /// Show the timetable of the selected student
    Timetable(TimetableArgs),
    /// Change display preferences
    Settings(SettingsArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match &cli.config_file_path {
        Some(path) => Config::from_file(path),
        None => Ok(Config::default()),
    };
    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let default_level = match cli.command {
        CliCommand::Gateway => "info",
        _ => "warn",
    };
    let _sentry = init_logging(&config.common, default_level);

    if let Err(e) = init_metrics(&config.common) {
        tracing::warn!(error = %e, "Metrics are disabled");
    }

    let result = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(CliError::from)
        .and_then(|runtime| runtime.block_on(run(cli.command, config)));

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: CliCommand, config: Config) -> Result<(), CliError> {
    if let CliCommand::Gateway = command {
        let gateway = config.gateway.ok_or(CliError::MissingGatewayConfig)?;
        tracing::info!("Starting gateway");
        return Ok(gateway::run(gateway, config.tenants).await?);
    }

    let gateway_url = config.client.gateway_url()?;
    let store = Box::new(FilesystemStateStore::new(&config.client.state_path));
    let source = Arc::new(ScheduleClient::new(gateway_url));
    let mut session = Session::new(config.tenants, config.client, store, source, std::io::stdout())?;

    match command {
        CliCommand::Gateway => Ok(()),
        CliCommand::Tenants => session.tenants(),
        CliCommand::UseTenant { tenant_id } => session.use_tenant(&tenant_id),
        CliCommand::Select(args) => session.select(&args).await,
        CliCommand::Timetable(args) => {
            session
                .timetable(&args, chrono::Local::now().naive_local())
                .await
        }
        CliCommand::Settings(args) => session.settings(&args),
    }
}

/// Logs go to stderr so command output stays clean on stdout. Events are also
/// forwarded to Sentry when a DSN is configured.
fn init_logging(common: &CommonConfig, default_level: &str) -> Option<sentry::ClientInitGuard> {
    let guard = common.logging.as_ref().map(|logging| {
        sentry::init((
            logging.sentry_dsn.as_str(),
            sentry::ClientOptions {
                release: sentry::release_name!(),
                ..Default::default()
            },
        ))
    });

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(sentry::integrations::tracing::layer())
        .init();

    guard
}

fn init_metrics(common: &CommonConfig) -> Result<(), CliError> {
    let Some(metrics) = &common.metrics else {
        return Ok(());
    };

    let recorder = StatsdBuilder::from(metrics.statsd_host.as_str(), metrics.statsd_port)
        .build(Some("unitime"))
        .map_err(|e| CliError::Metrics(e.to_string()))?;
    metrics::set_global_recorder(recorder).map_err(|e| CliError::Metrics(e.to_string()))?;
    shared::metrics_defs::describe_all(gateway::metrics_defs::ALL_METRICS);

    tracing::info!(host = %metrics.statsd_host, port = metrics.statsd_port, "Sending metrics to statsd");
    Ok(())
}
