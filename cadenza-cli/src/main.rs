mod commands;
mod shell;

use crate::shell::{Flow, Shell};
use cadenza_core::{
    CadenzaConfig, CoreError, Database, ProviderId, ResolutionEngine, Session, SessionEvent,
    SessionSettings, SystemClock,
};
use cadenza_provider_aggregator::AggregatorClient;
use clap::Parser;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const LOG_TARGET: &str = "cadenza";

/// Command-line arguments for cadenza
#[derive(Parser, Debug)]
#[command(name = "cadenza")]
#[command(about = "Search, queue and play music across unreliable providers")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/cadenza/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// State database (default: ~/.config/cadenza/state.db)
    #[arg(short, long)]
    state: Option<PathBuf>,

    /// Provider to search first (default: first configured provider)
    #[arg(long)]
    source: Option<String>,

    /// Do not resume the saved selection on startup
    #[arg(long)]
    no_resume: bool,
}

#[allow(clippy::too_many_lines)]
#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config_path = args.config.clone().unwrap_or_else(CadenzaConfig::config_path);

    init_tracing(check_file_logging_enabled(&config_path), &log_path_for(&config_path));

    let config = match CadenzaConfig::load_or_create_at(&config_path) {
        Ok(config) => config,
        Err(CoreError::ConfigNotFound { path }) => {
            println!(
                "Created a config template at {}. Set providers.base_url to your aggregator endpoint and run cadenza again.",
                path.display()
            );
            std::process::exit(0);
        }
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let db = match args.state.as_deref() {
        Some(path) => Database::open(path).await,
        None => Database::new().await,
    };
    let db = match db {
        Ok(db) => db,
        Err(e) => {
            error!("Failed to open state database: {}", e);
            std::process::exit(1);
        }
    };

    let client = match AggregatorClient::from_config(&config.providers) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to create provider client: {}", e);
            std::process::exit(1);
        }
    };

    let engine = ResolutionEngine::from_config(client, &config);
    info!(
        target: LOG_TARGET,
        "Providers in precedence order: {:?}",
        config.providers.order
    );

    let session = match Session::open(
        db.clone(),
        engine,
        Arc::new(SystemClock),
        SessionSettings::from_config(&config),
    )
    .await
    {
        Ok(session) => Arc::new(session),
        Err(e) => {
            error!("Failed to restore session: {}", e);
            std::process::exit(1);
        }
    };

    // Create shared cancellation token for graceful shutdown
    let cancel_token = CancellationToken::new();

    // Set up Ctrl+C handler to trigger graceful shutdown
    let ctrlc_token = cancel_token.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!(target: LOG_TARGET, "Received Ctrl+C, shutting down gracefully...");
        ctrlc_token.cancel();
    }) {
        error!("Failed to set Ctrl+C handler: {}", e);
    }

    tokio::spawn(log_session_events(session.clone(), cancel_token.clone()));

    let source = args
        .source
        .map(ProviderId::new)
        .or_else(|| config.providers.provider_ids().into_iter().next())
        .unwrap_or_else(|| ProviderId::new("netease"));
    let mut shell = Shell::new(session.clone(), source);

    if !args.no_resume {
        shell.resume().await;
    }
    run_shell(&mut shell, &cancel_token).await;

    cancel_token.cancel();
    if let Err(e) = db.checkpoint().await {
        warn!("Failed to checkpoint state database: {}", e);
    }
    info!(target: LOG_TARGET, "Bye");
}

/// Read commands from stdin until `quit`, EOF or Ctrl+C
async fn run_shell(shell: &mut Shell, cancel_token: &CancellationToken) {
    println!("cadenza {} - type `help` for commands", env!("CARGO_PKG_VERSION"));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if shell.handle_line(&line).await == Flow::Quit {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read input: {}", e);
                    break;
                }
            },
        }
    }
}

/// Log session events until shutdown
async fn log_session_events(session: Arc<Session>, cancel_token: CancellationToken) {
    let mut rx = session.subscribe();

    loop {
        let event = tokio::select! {
            () = cancel_token.cancelled() => break,
            event = rx.recv() => event,
        };
        match event {
            Ok(event) => match &event {
                SessionEvent::StreamResolved { track, stream } => {
                    info!(
                        target: LOG_TARGET,
                        "Stream ready: {} at {}kbps from {}",
                        track, stream.bitrate_kbps, stream.source
                    );
                }
                SessionEvent::StreamFailed { track, message } => {
                    warn!(target: LOG_TARGET, "Stream failed for {}: {}", track, message);
                }
                SessionEvent::CoverResolved { url } => {
                    debug!(target: LOG_TARGET, "Cover: {}", url);
                }
                SessionEvent::LyricsLoaded { cues } => {
                    info!(target: LOG_TARGET, "Lyrics loaded: {} lines", cues);
                }
                SessionEvent::LyricsNotFound => {
                    info!(target: LOG_TARGET, "No lyrics found for current track");
                }
                SessionEvent::RateLimited { retry_after } => {
                    warn!(target: LOG_TARGET, "Search rate limited, retry after {:?}", retry_after);
                }
                SessionEvent::PlaylistChanged { len, current } => {
                    debug!(target: LOG_TARGET, "Playlist: {} tracks, current {}", len, current);
                }
                SessionEvent::VolumeChanged { volume } => {
                    debug!(target: LOG_TARGET, "Volume set to {}", volume);
                }
                SessionEvent::PlaybackStopped => {
                    info!(target: LOG_TARGET, "Playback stopped");
                }
            },
            Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                warn!(target: LOG_TARGET, "Event logger lagged, skipped {} events", n);
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Read `[logging] file` before the full config load so the log file
/// captures config errors too
fn check_file_logging_enabled(config_path: &Path) -> bool {
    #[derive(serde::Deserialize)]
    struct PartialConfig {
        #[serde(default)]
        logging: PartialLoggingConfig,
    }
    #[derive(serde::Deserialize, Default)]
    struct PartialLoggingConfig {
        #[serde(default)]
        file: bool,
    }

    let Ok(content) = std::fs::read_to_string(config_path) else {
        return false;
    };

    toml::from_str::<PartialConfig>(&content)
        .map(|c| c.logging.file)
        .unwrap_or(false)
}

/// The log file sits next to the config file in use
fn log_path_for(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map_or_else(cadenza_core::paths::log_file_path, |dir| {
            dir.join(cadenza_core::paths::LOG_FILE_NAME)
        })
}

/// Initialize tracing with console output and optional file logging
fn init_tracing(file_logging_enabled: bool, log_path: &Path) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,cadenza=info"));

    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if file_logging_enabled {
        if let Some(parent) = log_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        match File::create(log_path) {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false);

                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt_layer)
                    .with(file_layer)
                    .init();

                return;
            }
            Err(e) => {
                eprintln!("Failed to create log file at {}: {e}", log_path.display());
            }
        }
    }

    // Fallback: console only
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
