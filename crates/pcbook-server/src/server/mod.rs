pub mod config;
pub mod context;
pub mod service;
pub mod store;
pub mod streaming;
pub mod telemetry;
