//! Command implementations for the CLI
//!
//! - start: Start the tracking server
//! - test: Test configuration validity
//! - config: Configuration display and validation

pub mod config;
pub mod start;
