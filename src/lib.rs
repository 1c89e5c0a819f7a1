#![forbid(unsafe_code)]

//! Proctored interview session server.
//!
//! Each interview session is owned by one actor that serializes violation
//! reports, turn submissions, stop requests, and deadline expiry into a
//! single ordered stream of persisted steps.

pub mod audit;
pub mod config;
pub mod errors;
pub mod generation;
pub mod http;
pub mod models;
pub mod orchestrator;
pub mod persistence;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
