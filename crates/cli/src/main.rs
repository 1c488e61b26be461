mod config_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    tgirc_config::{Severity, loader::DEFAULT_CONFIG_FILE},
    tgirc_relay::Bridge,
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "tgirc", version, about = "tgirc: relay a Telegram group to an IRC channel")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to the JSON config file. The update offset is written back here.
    #[arg(short, long, global = true, env = "TGIRC_CONFIG", default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Debug logging: every Telegram update and IRC line is traced.
    #[arg(short, long, global = true, default_value_t = false)]
    debug: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the relay (default when no subcommand is provided).
    Run,
    /// Validate the config file and report problems.
    Check {
        /// Show informational diagnostics in addition to warnings.
        #[arg(long)]
        verbose: bool,
    },
}

impl Cli {
    fn level(&self) -> &str {
        if self.debug { "debug" } else { &self.log_level }
    }
}

fn init_telemetry(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.level()));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

async fn run(config_path: &Path) -> anyhow::Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "tgirc starting"
    );

    let validated = config_commands::load(config_path)?;
    for d in &validated.diagnostics {
        match d.severity {
            Severity::Warning => warn!(key = %d.key, "{}", d.message),
            Severity::Info => info!(key = %d.key, "{}", d.message),
        }
    }

    let bot = tgirc_telegram::build_bot(&validated.config.token)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        on_signal.cancel();
    });

    Bridge::new(validated, config_path, bot).run(cancel).await?;
    info!("tgirc stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => run(&cli.config).await,
        Some(Commands::Check { verbose }) => config_commands::check(&cli.config, verbose),
    }
}
