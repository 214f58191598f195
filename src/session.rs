use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::envelope::{value_as_f64, value_as_string};
use crate::error::{ClientError, ClientResult};

/// Lifetime assumed when the upstream omits `expiresIn`.
pub const DEFAULT_EXPIRES_IN_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated,
    Expired,
    Failed,
}

/// Tokens issued by the login or refresh endpoint.
#[derive(Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<f64>,
}

impl TokenGrant {
    /// Reads `accessToken`, `refreshToken` and `expiresIn` from a login or
    /// refresh response body.
    pub fn from_value(root: &Value) -> ClientResult<Self> {
        let access_token = value_as_string(root.get("accessToken"))
            .ok_or_else(|| ClientError::auth("response missing accessToken"))?;
        Ok(Self {
            access_token,
            refresh_token: value_as_string(root.get("refreshToken")),
            expires_in: root.get("expiresIn").and_then(value_as_f64),
        })
    }
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &token_fingerprint(Some(&self.access_token)))
            .field(
                "refresh_token",
                &token_fingerprint(self.refresh_token.as_deref()),
            )
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Credentials plus the current token set. Never persisted.
///
/// Whenever `access_token` is set, `refresh_token` and `token_expiry` are
/// set too: they are only ever installed together by [`Session::apply_login`].
#[derive(Clone)]
pub struct Session {
    username: String,
    password: String,
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_expiry: Option<DateTime<Utc>>,
    failed: bool,
}

impl Session {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            access_token: None,
            refresh_token: None,
            token_expiry: None,
            failed: false,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.token_expiry
    }

    /// Installs a login grant. Both tokens must be present.
    pub fn apply_login(&mut self, grant: TokenGrant, now: DateTime<Utc>) -> ClientResult<()> {
        let refresh_token = grant
            .refresh_token
            .ok_or_else(|| ClientError::auth("login response missing refreshToken"))?;
        let expiry = expiry_from(grant.expires_in, now)?;
        self.access_token = Some(grant.access_token);
        self.refresh_token = Some(refresh_token);
        self.token_expiry = Some(expiry);
        self.failed = false;
        Ok(())
    }

    /// Installs a refresh grant. The refresh token itself is kept as is; the
    /// upstream does not rotate it.
    pub fn apply_refresh(&mut self, grant: TokenGrant, now: DateTime<Utc>) -> ClientResult<()> {
        if self.refresh_token.is_none() {
            return Err(ClientError::auth("refresh token not available"));
        }
        let expiry = expiry_from(grant.expires_in, now)?;
        self.access_token = Some(grant.access_token);
        self.token_expiry = Some(expiry);
        self.failed = false;
        Ok(())
    }

    /// Drops the access token after an unrecoverable auth failure. The
    /// refresh token is cleared too so the next attempt starts from login.
    pub fn mark_failed(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.token_expiry = None;
        self.failed = true;
    }

    /// True when the access token is missing or `now` has reached the expiry
    /// instant minus `margin`.
    pub fn needs_refresh(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        match (&self.access_token, self.token_expiry) {
            (Some(_), Some(expiry)) => expiry
                .checked_sub_signed(margin)
                .map_or(true, |refresh_at| now >= refresh_at),
            _ => true,
        }
    }

    pub fn state(&self, now: DateTime<Utc>) -> SessionState {
        if self.failed {
            return SessionState::Failed;
        }
        match (&self.access_token, self.token_expiry) {
            (Some(_), Some(expiry)) if now < expiry => SessionState::Authenticated,
            (Some(_), _) => SessionState::Expired,
            (None, _) => SessionState::Unauthenticated,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("access_token", &token_fingerprint(self.access_token()))
            .field("refresh_token", &token_fingerprint(self.refresh_token()))
            .field("token_expiry", &self.token_expiry)
            .field("failed", &self.failed)
            .finish()
    }
}

/// Expiry instant for a grant issued at `now`. A missing, non-positive or
/// unrepresentable `expiresIn` falls back to [`DEFAULT_EXPIRES_IN_SECS`].
fn expiry_from(expires_in: Option<f64>, now: DateTime<Utc>) -> ClientResult<DateTime<Utc>> {
    let granted = expires_in
        .filter(|seconds| seconds.is_finite() && *seconds > 0.0)
        .and_then(|seconds| Duration::try_milliseconds((seconds * 1000.0).round() as i64))
        .and_then(|lifetime| now.checked_add_signed(lifetime));
    if let Some(expiry) = granted {
        return Ok(expiry);
    }
    if let Some(seconds) = expires_in.filter(|seconds| *seconds > 0.0) {
        tracing::warn!(expires_in = seconds, "expiresIn out of range, using default lifetime");
    }
    Duration::try_seconds(DEFAULT_EXPIRES_IN_SECS)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| ClientError::auth("token expiry out of range"))
}

fn short_hash_hex(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    hex::encode(digest)[..16].to_string()
}

/// Stable, non-reversible identifier for a token, safe to log.
pub fn token_fingerprint(token: Option<&str>) -> Option<String> {
    let raw = token?.trim();
    if raw.is_empty() {
        return None;
    }
    Some(short_hash_hex(raw.as_bytes()))
}
