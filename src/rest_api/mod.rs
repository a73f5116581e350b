//! HTTP endpoints for probes and metrics scraping

mod handlers;
mod server;

pub use server::run_server;
