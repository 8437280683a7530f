//! HTTP surface: the rate limited `/api` endpoint and its server.

mod handlers;
mod server;

pub use handlers::{api_handler, router, AppState};
pub use server::HttpServer;
