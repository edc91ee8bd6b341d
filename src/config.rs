use crate::cli::Args;
use anyhow::{bail, Context, Result};
use reqwest::Url;
use std::path::PathBuf;
use std::time::Duration;

/// Which event kinds are forwarded, and how often the log is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchConfig {
    pub watch_accepted: bool,
    pub watch_failed: bool,
    pub watch_failed_invalid_username: bool,
    pub poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            watch_accepted: true,
            watch_failed: false,
            watch_failed_invalid_username: true,
            poll_interval: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackConfig {
    pub webhook_url: Url,
    pub channel: String,
    pub username: String,
    pub icon: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host_machine: String,
    pub log_file: PathBuf,
    pub state_file: PathBuf,
    /// Absent only in dry-run mode.
    pub slack: Option<SlackConfig>,
    pub watch: WatchConfig,
    pub dry_run: bool,
}

impl Config {
    pub fn from_args(args: &Args) -> Result<Self> {
        if args.host_machine_name.trim().is_empty() {
            bail!("Host machine name must not be empty");
        }
        if args.watch_interval == 0 {
            bail!("Watch interval must be at least one second");
        }
        if args.notify_timeout == 0 {
            bail!("Notify timeout must be at least one second");
        }

        let slack = match &args.slack_webhook_url {
            Some(url) => Some(SlackConfig {
                webhook_url: Self::parse_webhook_url(url)?,
                channel: args.slack_channel.clone(),
                username: args.slack_username.clone(),
                icon: args.slack_icon.clone(),
                timeout: Duration::from_secs(args.notify_timeout),
            }),
            None if args.dry_run => None,
            None => bail!("A webhook URL is required unless running with --dry-run"),
        };

        Ok(Config {
            host_machine: args.host_machine_name.clone(),
            log_file: args.log_file.clone(),
            state_file: args.state_file.clone(),
            slack,
            watch: WatchConfig {
                watch_accepted: args.watch_accepted_logins,
                watch_failed: args.watch_failed_logins,
                watch_failed_invalid_username: args.watch_failed_login_invalid_username,
                poll_interval: Duration::from_secs(args.watch_interval),
            },
            dry_run: args.dry_run,
        })
    }

    fn parse_webhook_url(raw: &str) -> Result<Url> {
        let url = Url::parse(raw).with_context(|| format!("Invalid webhook URL: {}", raw))?;

        match url.scheme() {
            "http" | "https" => Ok(url),
            other => bail!("Unsupported webhook URL scheme: {}", other),
        }
    }
}
