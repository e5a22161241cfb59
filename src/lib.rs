//! Bobo client library
//!
//! Headless client for the Bobo home-monitoring dashboard. All persistence,
//! authentication, and business logic live in an external managed backend;
//! this crate is the client-side plumbing around it.
//!
//! ## Architecture
//!
//! The codebase is organized into modules:
//! - `logging`: Structured logging with tracing
//! - `config`: Configuration management (paths, client settings)
//! - `alerts`: Alert/event data model and snapshot reconciliation
//! - `backend`: Data-backend client (rows API + dismiss function)
//! - `poller`: Polling loop, shared dashboard state, dismissal
//! - `media`: Media resolution by probing the storage bucket
//! - `chime`: Best-effort arrival sound
//!
//! ## Main Entry Points
//!
//! - [`spawn_poller`]: Start polling alerts for an identity
//! - [`dismiss_alert`]: Dismiss one alert optimistically
//! - [`fetch_past_alerts`]: Load the dismissed-alert history on demand

pub mod alerts;
pub mod backend;
pub mod chime;
pub mod config;
pub mod logging;
pub mod media;
pub mod poller;

pub use logging::init_tracing;
pub use poller::{
    dismiss_alert, fetch_past_alerts, spawn_poller, Dashboard, DashboardState, PollerHandle,
};
