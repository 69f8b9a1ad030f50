//! # courier-copilot
//!
//! GitHub Copilot seat invitations behind the courier bridge.
//!
//! The gateway binary authenticates HTTP callers and relays `/api/v1/*` onto
//! the `copilot-api` work queue. The worker binary consumes that queue with
//! [`CopilotApi`], which talks to GitHub and keeps a [`LicenseMirror`] of the
//! seats each organization may still hand out.

pub mod api;
pub mod config;
pub mod github;
pub mod health;
pub mod licenses;
pub mod signal;
pub mod telemetry;

pub use api::CopilotApi;
pub use config::{GatewayConfig, WorkerConfig};
pub use github::{GithubApi, GithubClient, GithubError, NewTeam, Organization, Team};
pub use health::{HealthReport, HealthTicker};
pub use licenses::{LicenseError, LicenseMirror, LicenseSource, SmartsheetSource};

#[cfg(any(test, feature = "test-support"))]
pub use licenses::MemoryLicenseSource;
