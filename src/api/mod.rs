//! HTTP surface: routes, session extractors, handlers and the JSON envelope.

pub mod error;
pub mod handlers;
mod router;
pub mod session;
mod types;

pub use router::build_router;
pub use types::AppState;
