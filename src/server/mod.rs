//! HTTP tier: state, router, and endpoint handlers.

pub mod router;
pub mod routes;
pub mod state;

pub use router::build_router;
pub use state::AppState;
