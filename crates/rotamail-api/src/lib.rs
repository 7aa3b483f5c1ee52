//! Rotamail API - REST API server
//!
//! Account management, campaign submission and the open/click tracking
//! endpoints that instrumented emails call back into.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
