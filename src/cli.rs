use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ssh-watcher",
    about = "Tails the SSH auth log and forwards login events to a chat webhook",
    version = "0.2.0",
    long_about = "ssh-watcher follows the sshd authentication log, detects accepted and failed logins, and posts the events it is told to watch to a Slack-compatible webhook. Progress is checkpointed so restarts do not replay history. Every option can also be set through its environment variable."
)]
pub struct Args {
    /// Name of this machine, included in every notification
    #[arg(long = "host-machine-name", env = "HOST_MACHINE_NAME")]
    pub host_machine_name: String,

    /// Incoming webhook URL notifications are posted to
    #[arg(
        long = "slack-webhook-url",
        env = "SLACK_WEBHOOK_URL",
        required_unless_present = "dry_run"
    )]
    pub slack_webhook_url: Option<String>,

    /// Channel to post into
    #[arg(long = "slack-channel", env = "SLACK_CHANNEL", default_value = "#ssh-alerts")]
    pub slack_channel: String,

    /// Username the bot posts as
    #[arg(long = "slack-username", env = "SLACK_USERNAME", default_value = "poe-ssh-bot")]
    pub slack_username: String,

    /// Icon emoji the bot posts with
    #[arg(long = "slack-icon", env = "SLACK_ICON", default_value = ":ghost:")]
    pub slack_icon: String,

    /// Authentication log to follow
    #[arg(long = "log-file", env = "WATCH_LOGFILE", default_value = "/var/log/auth.log")]
    pub log_file: PathBuf,

    /// File recording the last processed line, so restarts do not replay history
    #[arg(
        long = "state-file",
        env = "STATE_FILE_PATH",
        default_value = "/var/lib/ssh-watcher/authlog-state"
    )]
    pub state_file: PathBuf,

    /// Notify on successful logins
    #[arg(
        long = "watch-accepted-logins",
        env = "WATCH_SETTINGS_ACCEPTED_LOGINS",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub watch_accepted_logins: bool,

    /// Notify on failed logins
    #[arg(
        long = "watch-failed-logins",
        env = "WATCH_SETTINGS_FAILED_LOGINS",
        default_value = "false",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub watch_failed_logins: bool,

    /// Notify on failed logins naming a user that does not exist
    #[arg(
        long = "watch-failed-login-invalid-username",
        env = "WATCH_SETTINGS_FAILED_LOGIN_INVALID_USERNAME",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub watch_failed_login_invalid_username: bool,

    /// Seconds to sleep between polls of the log file
    #[arg(long = "watch-interval", env = "WATCH_SETTINGS_SLEEP_INTERVAL", default_value = "2")]
    pub watch_interval: u64,

    /// Seconds before a webhook request is abandoned
    #[arg(long = "notify-timeout", env = "SLACK_TIMEOUT", default_value = "5")]
    pub notify_timeout: u64,

    /// Classify the existing log once and print what would be sent
    #[arg(short = 'd', long = "dry-run")]
    pub dry_run: bool,
}
