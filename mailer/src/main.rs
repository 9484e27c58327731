//! Camwatch Mailer - camera event notifier.
//!
//! This binary watches the camera's sensor feed and emails a snapshot for
//! each accepted event.
//!
//! # Commands
//!
//! - `camwatch-mailer run`: Watch the sensor feed and send emails until it ends
//! - `camwatch-mailer oneshot`: Send a single email and exit
//!
//! # Environment Variables
//!
//! See the [`config`] module for available configuration options.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use camwatch_mailer::config::Config;
use camwatch_mailer::debounce::DebounceGate;
use camwatch_mailer::delivery::SmtpDelivery;
use camwatch_mailer::feed::{spawn_feed, FeedError};
use camwatch_mailer::notifier::{Notifier, NotifierSettings};
use camwatch_mailer::resolver::HttpAddressResolver;
use camwatch_mailer::snapshot::CommandSnapshotSource;

type CameraNotifier = Notifier<CommandSnapshotSource, SmtpDelivery, HttpAddressResolver>;

/// Camwatch Mailer - camera event notifier.
///
/// Emails a snapshot whenever the camera reports motion, sound, a person,
/// or a crying baby.
#[derive(Parser, Debug)]
#[command(name = "camwatch-mailer")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    CAMWATCH_MAIL_FROM          Sender address (required)
    CAMWATCH_MAIL_TO            Recipient address (required)
    CAMWATCH_SMTP_USER          SMTP account (required)
    CAMWATCH_SMTP_PASSWORD      SMTP password (required)
    CAMWATCH_SMTP_HOST          SMTP host (required)
    CAMWATCH_SMTP_PORT          SMTP port (default: 587)
    CAMWATCH_RESOLUTION         low, high, none (default: low)
    CAMWATCH_STREAM_LINK        on, off (default: off)
    CAMWATCH_COOLDOWN_SECS      Seconds between emails (default: 600)
    CAMWATCH_SKIP_EVENTS        Events to skip, e.g. 'shb' for motion only
    CAMWATCH_LOG_FORMAT         text, json (default: text)
    RUST_LOG                    Log filter (default: info)

EXAMPLES:
    # Send a test email
    camwatch-mailer oneshot --event Test

    # Watch the camera
    camwatch-mailer run
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the sensor feed and email each accepted event.
    ///
    /// Exits with a failure status if the feed ends.
    Run,

    /// Send one email immediately and exit.
    ///
    /// Exit status is 0 if the email was delivered.
    Oneshot {
        /// Event name written into the email.
        #[arg(short, long, default_value = "")]
        event: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async {
        match cli.command {
            Command::Run => run_continuous().await,
            Command::Oneshot { event } => run_oneshot(&event).await,
        }
    });

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Camwatch Mailer stopped: {e:#}");
            ExitCode::FAILURE
        }
    }
}

/// Loads configuration and wires up the production collaborators.
fn build_notifier() -> Result<(Config, CameraNotifier)> {
    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        smtp_server = %config.smtp.server(),
        resolution = %config.resolution,
        cooldown_secs = config.cooldown.as_secs(),
        stream_link = config.stream_link,
        host_label = %config.host_label,
        "Configuration loaded"
    );

    let transport = SmtpDelivery::new(&config.smtp).context("Failed to set up SMTP transport")?;
    let snapshots = CommandSnapshotSource::new(&config.snapshot_command, &config.model_suffix);
    let resolver = if config.stream_link {
        Some(
            HttpAddressResolver::new(config.address_endpoints.clone())
                .context("Failed to set up address resolver")?,
        )
    } else {
        None
    };

    let gate = DebounceGate::new(config.cooldown, config.enabled_events.clone());
    let notifier = Notifier::new(
        NotifierSettings::from_config(&config),
        gate,
        snapshots,
        transport,
        resolver,
    );

    Ok((config, notifier))
}

/// Sends a single email.
async fn run_oneshot(event: &str) -> Result<()> {
    info!("Camwatch Mailer started (oneshot)");

    let (_config, mut notifier) = build_notifier()?;

    notifier
        .notify(event, Utc::now())
        .await
        .context("Failed to send email")?;

    info!(event = %event, "Email sent");
    Ok(())
}

/// Watches the sensor feed until it ends or a shutdown signal arrives.
async fn run_continuous() -> Result<()> {
    info!("Camwatch Mailer started");

    let (config, mut notifier) = build_notifier()?;

    if config.enabled_events.is_empty() {
        warn!("All event kinds are skipped; no emails will be sent");
    }

    let (mut child, mut feed) = spawn_feed(&config.feed_command)
        .context("Failed to start the sensor feed")?;

    info!("Mailer running. Press Ctrl+C to stop.");

    let reason = tokio::select! {
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received");
            return Ok(());
        }
        reason = notifier.run(&mut feed) => reason,
    };

    // A closed feed usually means the feed program exited; report its status.
    let reason = match reason {
        FeedError::Closed => match child.wait().await {
            Ok(status) => FeedError::Exited(status),
            Err(e) => FeedError::Io(e),
        },
        other => other,
    };

    Err(reason).context("Sensor feed ended")
}

/// Initializes the logging subsystem.
///
/// `CAMWATCH_LOG_FORMAT=json` switches to one JSON object per line.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("CAMWATCH_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true);

    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
