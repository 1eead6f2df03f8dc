//! Gateway: the HTTP server that receives webhook updates and feeds them to
//! the router.
//!
//! Lifecycle:
//! 1. Load + validate config
//! 2. Open the database, build the router and its collaborators
//! 3. Register the webhook when a public URL is configured
//! 4. Serve `POST <webhook_path>` and `GET /health` until Ctrl-C

pub mod server;
pub mod state;

pub use {
    server::{build_gateway_app, build_router, start_gateway, telegram_outbound},
    state::{DedupeCache, GatewayState},
};
