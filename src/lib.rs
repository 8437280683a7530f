//! Tollgate - Per-client fixed-window rate limiting
//!
//! This crate caps how many requests one client identity may issue per
//! fixed time window. Counters live in a shared key-value store (Redis in
//! production) so every instance of the service enforces the same limits.

pub mod config;
pub mod error;
pub mod http;
pub mod identity;
pub mod ratelimit;
pub mod store;
