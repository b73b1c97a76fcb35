//! Async client runtime for the floodwatch feed: REST baseline fetch, SSE
//! stream source, the single-consumer session loop, and vote coordination.

pub mod api;
pub mod config;
pub mod display;
pub mod error;
pub mod session;
pub mod stream;
pub mod vote;
