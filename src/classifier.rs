use serde::Serialize;
use std::fmt;
use tracing::warn;

/// The SSH authentication outcomes we recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "logged in")]
    LoggedIn,
    #[serde(rename = "failed login attempt")]
    FailedLoginAttempt,
    #[serde(rename = "failed login attempt with invalid username")]
    FailedLoginAttemptInvalidUsername,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::LoggedIn => "logged in",
            EventKind::FailedLoginAttempt => "failed login attempt",
            EventKind::FailedLoginAttemptInvalidUsername => {
                "failed login attempt with invalid username"
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classified line of the auth log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub username: String,
    pub ip_address: String,
    pub login_time: String,
    #[serde(rename = "event_type")]
    pub event_kind: EventKind,
    pub host_machine: String,
}

impl LogEvent {
    /// Stamp the event with the machine it was observed on.
    pub fn with_host(mut self, host_machine: &str) -> Self {
        self.host_machine = host_machine.to_string();
        self
    }
}

/// Classify a raw auth log line.
///
/// Returns `None` for anything that is not an sshd login event, and for
/// sshd lines whose fields cannot be extracted (e.g. `from` as the last
/// token). The invalid-user check runs before the generic failure check,
/// so `Failed password for invalid user x` is an invalid-username event.
pub fn classify(line: &str) -> Option<LogEvent> {
    let kind = classify_kind(line)?;

    match extract_fields(line, kind) {
        Some(event) => Some(event),
        None => {
            warn!(line = %line, "Skipping malformed sshd line");
            None
        }
    }
}

fn classify_kind(line: &str) -> Option<EventKind> {
    if !line.contains("sshd") {
        return None;
    }

    if line.contains("Accepted password") || line.contains("Accepted publickey") {
        Some(EventKind::LoggedIn)
    } else if line.to_lowercase().contains("invalid user") {
        Some(EventKind::FailedLoginAttemptInvalidUsername)
    } else if line.contains("Failed password")
        || line.contains("Connection closed by authenticating user")
    {
        Some(EventKind::FailedLoginAttempt)
    } else {
        None
    }
}

fn extract_fields(line: &str, event_kind: EventKind) -> Option<LogEvent> {
    let parts: Vec<&str> = line.split(' ').collect();
    if parts.len() < 2 {
        return None;
    }

    let login_time = format!("{} {}", parts[0], parts[1]);
    let mut ip_address = String::new();
    let mut username = String::new();

    for (i, part) in parts.iter().enumerate() {
        // A keyword without a value means the line was cut short.
        let next = parts.get(i + 1);
        if *part == "from" {
            ip_address = next?.to_string();
        }
        if *part == "user" || *part == "for" {
            username = next?.to_string();
        }
    }

    Some(LogEvent {
        username,
        ip_address,
        login_time,
        event_kind,
        host_machine: String::new(),
    })
}
