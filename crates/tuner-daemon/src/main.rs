use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tuner_daemon::client;
use tuner_daemon::daemon::Daemon;
use tuner_daemon::pidfile;
use tuner_proto::config::Config;
use tuner_proto::protocol::is_error_reply;

#[derive(Debug, Parser)]
#[command(name = "tunerd", version, about = "Internet radio control daemon")]
struct Cli {
    /// Config file (default: ~/.config/tuner/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Run the daemon in the foreground
    Daemon,
    /// Report whether the daemon runs and what it is playing
    Status,
    /// Any other command is sent to the running daemon, e.g. `tunerd volume +5`
    #[command(external_subcommand)]
    Send(Vec<String>),
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Some(CliCommand::Daemon) => {
            init_logging()?;
            run_daemon(config).await?;
            Ok(ExitCode::SUCCESS)
        }
        Some(CliCommand::Status) => {
            match pidfile::running_pid(&config.daemon.pid_file) {
                Some(pid) => println!("daemon running (pid {})", pid),
                None => {
                    println!("daemon not running");
                    return Ok(ExitCode::FAILURE);
                }
            }
            forward(&config.daemon.control_socket, "status").await
        }
        Some(CliCommand::Send(words)) => forward(&config.daemon.control_socket, &words.join(" ")).await,
        None => forward(&config.daemon.control_socket, "status").await,
    }
}

async fn run_daemon(config: Config) -> anyhow::Result<()> {
    info!("config: {:?}", config);
    let daemon = Daemon::start(config).await?;
    let result = daemon.run_until_quit().await;
    daemon.shutdown().await;
    result
}

async fn forward(socket_path: &Path, command: &str) -> anyhow::Result<ExitCode> {
    match client::send_command(socket_path, command).await {
        Ok(reply) => {
            println!("{}", reply);
            if is_error_reply(&reply) {
                Ok(ExitCode::FAILURE)
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Err(e) => {
            eprintln!("{} (is the daemon running?)", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

/// File layer under the data dir plus stderr, both behind `RUST_LOG`.
fn init_logging() -> anyhow::Result<()> {
    let data_dir = tuner_proto::platform::data_dir();
    std::fs::create_dir_all(&data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tuner_daemon=debug")),
        )
        .init();

    info!("log file: {:?}", log_path);
    Ok(())
}
