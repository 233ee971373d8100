//! Utility functions shared across modules.

pub mod fs;

pub use fs::{atomic_write, ensure_dir, expand_path};
