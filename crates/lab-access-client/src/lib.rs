//! # lab-access-client
//!
//! A Rust client for the SISTEM AKSES LAB backend: the RFID lab access
//! system used by school administrators to manage cards and rooms, review
//! access logs and watch lab occupancy live.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use lab_access_client::{ApiClient, LabConfig, Notifier, SessionStore, TokenStore};
//! use lab_access_client::api::auth::LoginRequest;
//!
//! #[tokio::main]
//! async fn main() -> lab_access_client::LabResult<()> {
//!     // Load config from environment or lab-access.toml
//!     let config = LabConfig::discover(None)?;
//!     let tokens = TokenStore::open(config.token_path())?;
//!     let api = ApiClient::new(&config, tokens.clone())?;
//!
//!     let session = Arc::new(SessionStore::new(api.clone(), tokens, Notifier::new()));
//!     if session.login(&LoginRequest::new("admin", "secret")).await {
//!         println!("Logged in as {:?}", session.snapshot().username());
//!     }
//!
//!     session.logout();
//!     Ok(())
//! }
//! ```
//!
//! ## Components
//!
//! | Component | Type | Role |
//! |-----------|------|------|
//! | Session | [`SessionStore`] | login / logout / verification, owns the token |
//! | Guard | [`AuthGuard`] | verifies on mount and when the session drops |
//! | REST | [`ApiClient`] | envelope-aware HTTP client, one trait per endpoint group |
//! | Realtime | [`HubConnection`] | hub client with negotiate, long polling / WebSockets, reconnect |
//! | Dashboard | [`DashboardController`] | baseline fetch + live deltas |
//! | Activity | [`ActivityFilter`] | client-side access log filtering |
//! | Mutations | [`Mutations`] | card / room create, update, delete |
//!
//! ## Configuration
//!
//! See [`LabConfig`] for the full configuration reference. The simplest
//! setup uses an environment variable:
//!
//! ```bash
//! export LAB_API_URL="http://localhost:5000/api"
//! ```
//!
//! Or a `lab-access.toml` file:
//!
//! ```toml
//! api_url = "http://localhost:5000/api"
//!
//! [hub]
//! transport = "long_polling"
//! ```

pub mod activity;
pub mod api;
pub mod config;
pub mod crud;
pub mod dashboard;
pub mod error;
pub mod forms;
pub mod guard;
pub mod hub;
pub mod notice;
pub mod route;
pub mod session;
pub mod token;

// ─── Public re-exports ──────────────────────────────────────────────────

pub use activity::{ActivityFilter, FilterCriteria, FilterOptions};
pub use api::ApiClient;
pub use config::LabConfig;
pub use crud::{Mutations, QueryCache, QueryKey};
pub use dashboard::{DashboardController, DashboardOptions, DashboardState};
pub use error::{LabError, LabResult, UnauthorizedHook};
pub use guard::AuthGuard;
pub use hub::{HubConnection, HubEvent, LiveFeed};
pub use notice::{Notice, Notifier};
pub use route::Route;
pub use session::{Session, SessionStore};
pub use token::TokenStore;
