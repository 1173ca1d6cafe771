//! Shared test utilities for the weather-ipfs workspace.
//!
//! This crate provides common testing infrastructure including:
//! - [`MemoryStore`], an in-memory IPFS node (objects, MFS, IPNS) with a
//!   call log and failure injection
//! - Telemetry payload fixtures and content hashes
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, MemoryStore, StoreOp};
//! ```

pub mod fixtures;
pub mod memory_store;

pub use memory_store::{MemoryStore, StoreCall, StoreOp};

/// Poll `condition` every 5ms until it holds or `timeout_ms` elapses.
///
/// Returns whether the condition was met. Used to observe background
/// workers without fixed sleeps.
pub async fn wait_until<F>(timeout_ms: u64, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_millis(timeout_ms);
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}
