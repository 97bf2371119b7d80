//! Library crate for edge-rank-rs: probe candidate endpoints and rank them by connect latency.
pub mod candidate;
pub mod config;
pub mod engine;
pub mod prober;
pub mod rank;
pub mod report;
pub mod scanner;
pub mod server;
pub mod sources;
pub mod types;
