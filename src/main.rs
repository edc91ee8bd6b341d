use clap::Parser;
use ssh_watcher::checkpoint::FileCheckpointStore;
use ssh_watcher::classifier::EventKind;
use ssh_watcher::cli::Args;
use ssh_watcher::config::Config;
use ssh_watcher::notifier::SlackNotifier;
use ssh_watcher::watcher::{scan_existing, LogWatcher};
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Logs go to stderr; stdout is reserved for dry-run output
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match Config::from_args(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            process::exit(2);
        }
    };

    if config.dry_run {
        process::exit(run_dry(&config));
    }

    let notifier = match config.slack.as_ref().map(SlackNotifier::new) {
        Some(Ok(notifier)) => notifier,
        Some(Err(e)) => {
            eprintln!("Configuration error: {}", e);
            process::exit(2);
        }
        None => {
            eprintln!("Configuration error: no webhook configured");
            process::exit(2);
        }
    };
    let store = FileCheckpointStore::new(&config.state_file);

    info!(
        host = %config.host_machine,
        log_file = %config.log_file.display(),
        state_file = %config.state_file.display(),
        "Starting ssh-watcher"
    );

    let mut watcher = LogWatcher::new(
        &config.log_file,
        &config.host_machine,
        config.watch,
        notifier,
        store,
    );

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_signal(cancel.clone()));

    match watcher.run(cancel).await {
        Ok(()) => {
            info!("ssh-watcher stopped");
            process::exit(0);
        }
        Err(e) => {
            error!("ssh-watcher failed: {}", e);
            process::exit(1);
        }
    }
}

fn run_dry(config: &Config) -> i32 {
    let summary = match scan_existing(&config.log_file, &config.host_machine, &config.watch) {
        Ok(summary) => summary,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };

    for event in &summary.notifiable {
        println!(
            "[DRY-RUN] {} {} {} from {}",
            event.login_time, event.username, event.event_kind, event.ip_address
        );
    }

    println!("Dry-run summary: {} lines scanned", summary.lines);
    for kind in [
        EventKind::LoggedIn,
        EventKind::FailedLoginAttempt,
        EventKind::FailedLoginAttemptInvalidUsername,
    ] {
        let count = summary.counts.get(&kind).copied().unwrap_or(0);
        println!("  {}: {} events", kind, count);
    }
    println!("Dry-run complete. No notifications sent.");
    0
}

async fn shutdown_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
    cancel.cancel();
}
