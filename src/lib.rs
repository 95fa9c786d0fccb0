//! FerreMas unified HTTP gateway.
//!
//! A single HTTP surface in front of three backends: the FerreMas
//! inventory/sales API, Stripe Checkout, and an FX rate provider. The gateway
//! issues static tokens at login, checks them on every protected route, and
//! relays requests upstream without interpreting the payloads.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`auth`] | Accounts, token authority and the per-route guards |
//! | [`config`] | Configuration file and environment resolution |
//! | [`error`] | The uniform `{"error": ...}` response |
//! | [`forwarder`] | Relay to the inventory API |
//! | [`fx`] | Exchange-rate lookups |
//! | [`gateway`] | Shared state and router assembly |
//! | [`handlers`] | Login, FX and payment endpoints |
//! | [`payment`] | Checkout sessions |
//! | [`routes`] | Declarative passthrough table |
//! | [`run`] | Server initialization and runtime |
//! | [`util`] | Shutdown signals and telemetry |
//!
//! # Running the Server
//!
//! ```bash
//! ferremas-gateway --config /path/to/config.json
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod fx;
pub mod gateway;
pub mod handlers;
pub mod payment;
pub mod routes;
pub mod run;
pub mod util;
