//! berth - Background containers and content-addressable image caching
//!
//! Runs containers in the background for integration tests, waiting on log
//! output or custom checks before handing them over, and caches built images
//! and exported build output by content fingerprint in a shared registry.

pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod orchestration;
pub mod process;
pub mod stream;
pub mod ui;

pub use error::{BerthError, BerthResult};
