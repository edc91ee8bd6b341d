use crate::classifier::EventKind;
use crate::config::WatchConfig;

/// Whether an event of this kind should be forwarded under `config`.
pub fn should_notify(kind: Option<EventKind>, config: &WatchConfig) -> bool {
    match kind {
        Some(EventKind::LoggedIn) => config.watch_accepted,
        Some(EventKind::FailedLoginAttempt) => config.watch_failed,
        Some(EventKind::FailedLoginAttemptInvalidUsername) => config.watch_failed_invalid_username,
        None => false,
    }
}
