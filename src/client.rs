//! Authenticated client for the ISP account API.
//!
//! Owns the session (credentials plus bearer/refresh tokens), refreshes the
//! bearer token before it expires, and retries a request exactly once after a
//! 401 or a network failure.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{ClientConfig, MAX_EXPIRY_MARGIN_SECS};
use crate::envelope::Envelope;
use crate::error::{truncate_chars, ClientError, ClientResult, ERROR_BODY_MAX_CHARS};
use crate::event_log::{SessionEvent, SessionEventLog};
use crate::session::{token_fingerprint, Session, SessionState, TokenGrant};

pub const LOGIN_ENDPOINT: &str = "Account/Login";
pub const REFRESH_ENDPOINT: &str = "Account/RefreshToken";
pub const USAGE_SUMMARY_ENDPOINT: &str = "BBVAS/UsageSummary";
pub const PROFILE_ENDPOINT: &str = "VAS/GetProfileRequest";
pub const BILL_STATUS_ENDPOINT: &str = "ebill/BillStatusRequest";
pub const EXTRA_GB_ENDPOINT: &str = "BBVAS/ExtraGB";
pub const VAS_BUNDLES_ENDPOINT: &str = "BBVAS/GetDashboardVASBundles";
pub const BILL_PAYMENT_ENDPOINT: &str = "AccountOMNI/BillPaymentRequest";

const LOGIN_CHANNEL_ID: &str = "WEB";
const LOGIN_ORIGIN: &str = "https://myslt.slt.lk";
const LOGIN_REFERER: &str = "https://myslt.slt.lk/";
const USER_AGENT: &str = "Mozilla/5.0";
const CLIENT_ID_HEADER: &str = "x-ibm-client-id";
const MAX_ATTEMPTS: usize = 2;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;
/// `(username, password) -> grant`
pub type LoginClient = Arc<dyn Fn(&str, &str) -> ClientResult<TokenGrant> + Send + Sync>;
/// `refresh_token -> grant`
pub type RefreshClient = Arc<dyn Fn(&str) -> ClientResult<TokenGrant> + Send + Sync>;
/// `(request, access_token) -> envelope`. Non-2xx responses must come back as
/// [`ClientError::Upstream`] and transport failures as [`ClientError::Network`].
pub type FetchClient = Arc<dyn Fn(&EndpointRequest, &str) -> ClientResult<Envelope> + Send + Sync>;

/// A GET against one endpoint path with its query parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointRequest {
    pub endpoint: String,
    pub params: BTreeMap<String, String>,
}

impl EndpointRequest {
    pub fn new(endpoint: &str, params: &[(&str, &str)]) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            params: params
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }
}

pub struct AuthenticatedClient {
    config: ClientConfig,
    session: Mutex<Session>,
    event_log: Option<SessionEventLog>,
    clock: Clock,
    login_client: LoginClient,
    refresh_client: RefreshClient,
    fetch_client: FetchClient,
}

impl AuthenticatedClient {
    /// Builds a client backed by blocking HTTP. No request is made until the
    /// first call needs a token.
    pub fn new(
        config: ClientConfig,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> ClientResult<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ClientError::Config(format!("failed to build HTTP client: {}", err)))?;
        Ok(Self::with_http(config, username, password, http))
    }

    fn with_http(
        config: ClientConfig,
        username: impl Into<String>,
        password: impl Into<String>,
        http: reqwest::blocking::Client,
    ) -> Self {
        let login_http = http.clone();
        let login_config = config.clone();
        let login_client: LoginClient = Arc::new(move |username, password| {
            default_login_client(&login_http, &login_config, username, password)
        });

        let refresh_http = http.clone();
        let refresh_config = config.clone();
        let refresh_client: RefreshClient = Arc::new(move |refresh_token| {
            default_refresh_client(&refresh_http, &refresh_config, refresh_token)
        });

        let fetch_config = config.clone();
        let fetch_client: FetchClient = Arc::new(move |request, access_token| {
            default_fetch_client(&http, &fetch_config, request, access_token)
        });

        Self::with_clients(
            config,
            username,
            password,
            Arc::new(Utc::now),
            login_client,
            refresh_client,
            fetch_client,
        )
    }

    /// Builds a client over caller-supplied transports and clock.
    pub fn with_clients(
        config: ClientConfig,
        username: impl Into<String>,
        password: impl Into<String>,
        clock: Clock,
        login_client: LoginClient,
        refresh_client: RefreshClient,
        fetch_client: FetchClient,
    ) -> Self {
        let event_log = config.event_log_dir.clone().map(SessionEventLog::new);
        Self {
            config,
            session: Mutex::new(Session::new(username, password)),
            event_log,
            clock,
            login_client,
            refresh_client,
            fetch_client,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        let now = (self.clock)();
        self.lock_session().state(now)
    }

    /// Expiry instant of the current access token, if any.
    pub fn token_expiry(&self) -> Option<DateTime<Utc>> {
        self.lock_session().token_expiry()
    }

    /// Submits the credentials and installs a fresh token set.
    pub fn login(&self) -> ClientResult<()> {
        let mut session = self.lock_session();
        self.login_locked(&mut session)
    }

    /// Exchanges the refresh token for a new access token.
    pub fn refresh_token(&self) -> ClientResult<()> {
        let mut session = self.lock_session();
        self.refresh_locked(&mut session)
    }

    /// Returns a usable access token, refreshing (or logging in when there is
    /// no refresh token) if the current one is missing or expired. Concurrent
    /// callers wait on the same refresh.
    pub fn ensure_valid_token(&self) -> ClientResult<String> {
        let mut session = self.lock_session();
        self.ensure_valid_locked(&mut session)
    }

    /// GETs `endpoint` with a bearer token. A 401 on the first attempt triggers
    /// one refresh and one retry; a network failure on the first attempt is
    /// retried once as is. Anything else is returned to the caller.
    pub fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> ClientResult<Envelope> {
        let request = EndpointRequest::new(endpoint, params);
        let mut token = self.ensure_valid_token()?;
        let mut attempt = 1;

        loop {
            debug!(endpoint, attempt, "fetching");
            let err = match (self.fetch_client)(&request, &token) {
                Ok(envelope) => {
                    if !envelope.is_success {
                        debug!(endpoint, status = ?envelope.status, "upstream reported failure");
                    }
                    return Ok(envelope);
                }
                Err(err) => err,
            };

            if attempt >= MAX_ATTEMPTS {
                self.log_fetch_failure(endpoint, attempt, &err);
                return Err(err);
            }

            if err.is_unauthorized() {
                warn!(endpoint, "access token rejected, refreshing");
                self.log_event(
                    SessionEvent::FetchUnauthorizedRetry,
                    &[
                        ("endpoint", Some(endpoint.to_string())),
                        ("token", token_fingerprint(Some(&token))),
                    ],
                );
                token = self.refresh_after_unauthorized(&token)?;
            } else if let ClientError::Network { message, .. } = &err {
                warn!(endpoint, error = %message, "network failure, retrying once");
                self.log_event(
                    SessionEvent::FetchNetworkRetry,
                    &[
                        ("endpoint", Some(endpoint.to_string())),
                        ("error", Some(message.clone())),
                    ],
                );
            } else {
                self.log_fetch_failure(endpoint, attempt, &err);
                return Err(err);
            }
            attempt += 1;
        }
    }

    pub fn get_usage_summary(&self, subscriber_id: &str) -> ClientResult<Envelope> {
        self.fetch(USAGE_SUMMARY_ENDPOINT, &[("subscriberID", subscriber_id)])
    }

    pub fn get_profile(&self, subscriber_id: &str) -> ClientResult<Envelope> {
        self.fetch(PROFILE_ENDPOINT, &[("subscriberID", subscriber_id)])
    }

    pub fn get_bill_status(&self, tp_no: &str, account_no: &str) -> ClientResult<Envelope> {
        self.fetch(
            BILL_STATUS_ENDPOINT,
            &[("tpNo", tp_no), ("accountNo", account_no)],
        )
    }

    pub fn get_vas_bundles(&self, subscriber_id: &str) -> ClientResult<Envelope> {
        self.fetch(VAS_BUNDLES_ENDPOINT, &[("subscriberID", subscriber_id)])
    }

    pub fn get_extra_gb(&self, subscriber_id: &str) -> ClientResult<Envelope> {
        self.fetch(EXTRA_GB_ENDPOINT, &[("subscriberID", subscriber_id)])
    }

    pub fn get_bill_payment_request(
        &self,
        tp_no: &str,
        account_no: &str,
    ) -> ClientResult<Envelope> {
        self.fetch(
            BILL_PAYMENT_ENDPOINT,
            &[("telephoneNo", tp_no), ("accountNo", account_no)],
        )
    }

    fn lock_session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn expiry_margin(&self) -> Duration {
        Duration::try_seconds(self.config.expiry_margin_secs.clamp(0, MAX_EXPIRY_MARGIN_SECS))
            .unwrap_or_else(Duration::zero)
    }

    fn ensure_valid_locked(&self, session: &mut Session) -> ClientResult<String> {
        let now = (self.clock)();
        if !session.needs_refresh(now, self.expiry_margin()) {
            if let Some(token) = session.access_token() {
                return Ok(token.to_string());
            }
        }

        if session.state(now) == SessionState::Failed && !self.config.relogin_on_refresh_failure {
            return Err(ClientError::auth(
                "session was rejected upstream; log in again to continue",
            ));
        }

        if session.refresh_token().is_some() {
            info!("access token expired, refreshing before request");
            self.refresh_locked(session)?;
        } else {
            self.login_locked(session)?;
        }

        session
            .access_token()
            .map(str::to_string)
            .ok_or_else(|| ClientError::auth("access token not available after authentication"))
    }

    /// Called after a 401. Skips the refresh when another caller has already
    /// replaced the rejected token.
    fn refresh_after_unauthorized(&self, rejected: &str) -> ClientResult<String> {
        let mut session = self.lock_session();
        let now = (self.clock)();
        if let Some(current) = session.access_token() {
            if current != rejected && !session.needs_refresh(now, self.expiry_margin()) {
                debug!("token already refreshed by another caller");
                return Ok(current.to_string());
            }
        }
        if session.refresh_token().is_some() {
            self.refresh_locked(&mut session)?;
        } else if self.config.relogin_on_refresh_failure {
            info!("no refresh token after rejection, logging in again");
            self.login_locked(&mut session)?;
        } else {
            return Err(ClientError::auth(
                "session was rejected upstream; log in again to continue",
            ));
        }
        session
            .access_token()
            .map(str::to_string)
            .ok_or_else(|| ClientError::auth("access token not available after refresh"))
    }

    fn login_locked(&self, session: &mut Session) -> ClientResult<()> {
        let result = (self.login_client)(session.username(), session.password())
            .and_then(|grant| session.apply_login(grant, (self.clock)()));

        match &result {
            Ok(()) => {
                info!(expires_at = ?session.token_expiry(), "login successful");
                self.log_event(
                    SessionEvent::LoginSuccess,
                    &[
                        ("token", token_fingerprint(session.access_token())),
                        ("expires_at", session.token_expiry().map(|at| at.to_rfc3339())),
                    ],
                );
            }
            Err(err) => {
                warn!(error = %err, "login failed");
                self.log_event(SessionEvent::LoginFailed, &[("error", Some(err.to_string()))]);
                if matches!(err, ClientError::Auth { .. }) {
                    session.mark_failed();
                }
            }
        }
        result
    }

    fn refresh_locked(&self, session: &mut Session) -> ClientResult<()> {
        let Some(refresh_token) = session.refresh_token().map(str::to_string) else {
            return Err(ClientError::auth("refresh token not available; log in first"));
        };

        let result = (self.refresh_client)(&refresh_token)
            .and_then(|grant| session.apply_refresh(grant, (self.clock)()));

        let err = match result {
            Ok(()) => {
                info!(expires_at = ?session.token_expiry(), "access token refreshed");
                self.log_event(
                    SessionEvent::TokenRefreshed,
                    &[
                        ("token", token_fingerprint(session.access_token())),
                        ("refresh_token", token_fingerprint(Some(&refresh_token))),
                        ("expires_at", session.token_expiry().map(|at| at.to_rfc3339())),
                    ],
                );
                return Ok(());
            }
            Err(err) => err,
        };

        warn!(error = %err, "token refresh failed");
        self.log_event(
            SessionEvent::TokenRefreshFailed,
            &[
                ("refresh_token", token_fingerprint(Some(&refresh_token))),
                ("error", Some(err.to_string())),
            ],
        );

        if !matches!(err, ClientError::Auth { .. }) {
            return Err(err);
        }
        session.mark_failed();
        if self.config.relogin_on_refresh_failure {
            info!("refresh rejected, falling back to login");
            return self.login_locked(session);
        }
        Err(err)
    }

    fn log_fetch_failure(&self, endpoint: &str, attempt: usize, err: &ClientError) {
        warn!(endpoint, attempt, error = %err, "fetch failed");
        self.log_event(
            SessionEvent::FetchFailed,
            &[
                ("endpoint", Some(endpoint.to_string())),
                ("attempt", Some(attempt.to_string())),
                ("error", Some(err.to_string())),
            ],
        );
    }

    fn log_event(&self, event: SessionEvent, fields: &[(&str, Option<String>)]) {
        if let Some(event_log) = &self.event_log {
            event_log.write(event, fields);
        }
    }
}

fn default_login_client(
    http: &reqwest::blocking::Client,
    config: &ClientConfig,
    username: &str,
    password: &str,
) -> ClientResult<TokenGrant> {
    let response = http
        .post(config.endpoint_url(LOGIN_ENDPOINT))
        .header(CLIENT_ID_HEADER, &config.client_id)
        .header("Origin", LOGIN_ORIGIN)
        .header("Referer", LOGIN_REFERER)
        .header("User-Agent", USER_AGENT)
        .form(&[
            ("username", username),
            ("password", password),
            ("channelID", LOGIN_CHANNEL_ID),
        ])
        .send()
        .map_err(|err| ClientError::network(LOGIN_ENDPOINT, err.to_string()))?;
    let (status, text) = read_response(LOGIN_ENDPOINT, response)?;

    check_grant_status(LOGIN_ENDPOINT, "login", status, &text)?;
    let root = parse_grant_body(&text, "login")?;
    let grant = TokenGrant::from_value(&root)?;
    if grant.refresh_token.is_none() {
        return Err(ClientError::auth("login response missing refreshToken"));
    }
    Ok(grant)
}

fn default_refresh_client(
    http: &reqwest::blocking::Client,
    config: &ClientConfig,
    refresh_token: &str,
) -> ClientResult<TokenGrant> {
    let body = serde_json::json!({ "refreshToken": refresh_token });
    let response = http
        .post(config.endpoint_url(REFRESH_ENDPOINT))
        .header(CLIENT_ID_HEADER, &config.client_id)
        .header("User-Agent", USER_AGENT)
        .json(&body)
        .send()
        .map_err(|err| ClientError::network(REFRESH_ENDPOINT, err.to_string()))?;
    let (status, text) = read_response(REFRESH_ENDPOINT, response)?;

    check_grant_status(REFRESH_ENDPOINT, "refresh", status, &text)?;
    let root = parse_grant_body(&text, "refresh")?;
    TokenGrant::from_value(&root)
}

fn default_fetch_client(
    http: &reqwest::blocking::Client,
    config: &ClientConfig,
    request: &EndpointRequest,
    access_token: &str,
) -> ClientResult<Envelope> {
    let endpoint = request.endpoint.as_str();
    let response = http
        .get(config.endpoint_url(endpoint))
        .header(CLIENT_ID_HEADER, &config.client_id)
        .header("Content-Type", "application/json")
        .header("User-Agent", USER_AGENT)
        .bearer_auth(access_token)
        .query(&request.params)
        .send()
        .map_err(|err| ClientError::network(endpoint, err.to_string()))?;
    let (status, text) = read_response(endpoint, response)?;

    if !(200..300).contains(&status) {
        return Err(ClientError::upstream(endpoint, status, &text));
    }
    Envelope::from_json(&text)
}

fn read_response(
    endpoint: &str,
    response: reqwest::blocking::Response,
) -> ClientResult<(u16, String)> {
    let status = response.status().as_u16();
    let text = response.text().map_err(|err| {
        ClientError::network(endpoint, format!("failed to read response: {}", err))
    })?;
    Ok((status, text))
}

/// 400, 401 and 403 mean the credentials or refresh token were rejected.
/// Any other non-200 status is an outage and leaves the session untouched.
fn check_grant_status(endpoint: &str, context: &str, status: u16, text: &str) -> ClientResult<()> {
    match status {
        200 => Ok(()),
        400 | 401 | 403 => Err(ClientError::auth(format!(
            "{} failed ({}): {}",
            context,
            status,
            truncate_chars(text, ERROR_BODY_MAX_CHARS)
        ))),
        _ => Err(ClientError::upstream(endpoint, status, text)),
    }
}

fn parse_grant_body(text: &str, context: &str) -> ClientResult<Value> {
    serde_json::from_str(text).map_err(|err| {
        ClientError::auth(format!("{} response is not JSON: {}", context, err))
    })
}
