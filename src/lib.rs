//! # myslt
//!
//! Session-managed client for a consumer ISP account API, plus the usage
//! accounting derived from its payloads.
//!
//! The [`AuthenticatedClient`] logs in, keeps the bearer token fresh and
//! retries a request once after a 401. The pure modules ([`usage`],
//! [`summary`], [`spike`], [`reports`]) turn the returned [`Envelope`]s into
//! typed results that a chat bot or REST shell can present.
//!
//! ```rust,ignore
//! use myslt::{summary, AuthenticatedClient, Config};
//!
//! let config = Config::from_env()?;
//! let client = AuthenticatedClient::new(config.client.clone(), &config.username, &config.password)?;
//! let envelope = client.get_usage_summary(&config.subscriber_id)?;
//! println!("{}", summary::render_daily_summary(&summary::summarize(&envelope)?));
//! ```

pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event_log;
pub mod logging;
pub mod reports;
pub mod session;
pub mod spike;
pub mod summary;
pub mod usage;

pub use client::{AuthenticatedClient, EndpointRequest};
pub use config::{ClientConfig, Config};
pub use envelope::Envelope;
pub use error::{ClientError, ClientResult};
pub use session::{Session, SessionState, TokenGrant};
pub use spike::{detect_spike, SpikeReport, SpikeTracker};
pub use usage::{compute_bucket, split_daytime_nighttime, UsageBucket, UsageSummary};
