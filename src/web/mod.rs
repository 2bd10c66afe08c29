//! HTTP surface of filedepot.
//!
//! The same file routes are served under every API version prefix and all
//! responses share the `{code, message, data}` envelope.

pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod router;
pub mod server;

pub use error::ApiError;
pub use handlers::AppState;
pub use router::{create_router, API_VERSIONS};
pub use server::WebServer;
