use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

const LOG_FILE_NAME: &str = "session-events.log";
const ROTATED_FILE_NAME: &str = "session-events.log.1";
const MAX_LOG_BYTES: u64 = 5 * 1024 * 1024;

/// Auth and retry milestones recorded in the event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    LoginSuccess,
    LoginFailed,
    TokenRefreshed,
    TokenRefreshFailed,
    FetchUnauthorizedRetry,
    FetchNetworkRetry,
    FetchFailed,
}

impl SessionEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailed => "login_failed",
            Self::TokenRefreshed => "token_refreshed",
            Self::TokenRefreshFailed => "token_refresh_failed",
            Self::FetchUnauthorizedRetry => "fetch_unauthorized_retry",
            Self::FetchNetworkRetry => "fetch_network_retry",
            Self::FetchFailed => "fetch_failed",
        }
    }
}

/// Append-only JSONL audit trail of login, refresh and retry events.
///
/// Writes are best-effort: an I/O failure never reaches the caller. Values
/// are written as given, so callers pass token fingerprints, never tokens.
#[derive(Debug, Clone)]
pub struct SessionEventLog {
    log_file: PathBuf,
    max_log_bytes: u64,
}

impl SessionEventLog {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_file: log_dir.into().join(LOG_FILE_NAME),
            max_log_bytes: MAX_LOG_BYTES,
        }
    }

    #[cfg(test)]
    fn with_max_bytes(mut self, max_log_bytes: u64) -> Self {
        self.max_log_bytes = max_log_bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.log_file
    }

    /// Records `event` with the non-blank `fields`.
    pub fn write(&self, event: SessionEvent, fields: &[(&str, Option<String>)]) {
        let line = event_line(event, fields, Utc::now());
        if let Err(err) = self.append(&line) {
            tracing::debug!(error = %err, event = event.as_str(), "failed to write session event");
        }
    }

    fn append(&self, line: &str) -> io::Result<()> {
        if let Some(dir) = self.log_file.parent() {
            fs::create_dir_all(dir)?;
        }
        self.rotate_if_needed()?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)?;
        restrict_permissions(&file);
        writeln!(file, "{}", line)
    }

    /// Moves an oversized log to the single `.1` generation, replacing the
    /// previous one.
    fn rotate_if_needed(&self) -> io::Result<()> {
        let oversized = fs::metadata(&self.log_file)
            .map(|metadata| metadata.len() > self.max_log_bytes)
            .unwrap_or(false);
        if !oversized {
            return Ok(());
        }
        let rotated = self.log_file.with_file_name(ROTATED_FILE_NAME);
        match fs::remove_file(&rotated) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
            _ => {}
        }
        fs::rename(&self.log_file, rotated)
    }
}

fn event_line(event: SessionEvent, fields: &[(&str, Option<String>)], at: DateTime<Utc>) -> String {
    let mut record = Map::new();
    record.insert(
        "timestamp".to_string(),
        Value::String(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
    );
    record.insert("event".to_string(), Value::String(event.as_str().to_string()));
    let present = fields.iter().filter_map(|(key, value)| {
        let value = value.as_deref()?.trim();
        (!value.is_empty()).then(|| (key.to_string(), Value::String(value.to_string())))
    });
    record.extend(present);
    Value::Object(record).to_string()
}

#[cfg(unix)]
fn restrict_permissions(file: &fs::File) {
    use std::os::unix::fs::PermissionsExt;
    let _ = file.set_permissions(fs::Permissions::from_mode(0o600));
}

#[cfg(not(unix))]
fn restrict_permissions(_file: &fs::File) {}
