//! Integration test suite for remote-images
//!
//! End-to-end tests that drive records through path evaluation, fetching,
//! the association cache and the field resolvers, plus the command-line
//! surface.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! ```
//!
//! # Test Organization
//!
//! - **pipeline**: Records in, cache entries and resolved fields out
//! - **file_cache**: Durable cache store across handles
//! - **cli**: `validate`, `process` and `resolve` commands

mod cli;
mod file_cache;
mod pipeline;
