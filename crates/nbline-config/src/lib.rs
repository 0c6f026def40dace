//! Configuration types and loaders for nbline.
//!
//! This crate owns the on-disk configuration schema so the core library and
//! both binaries share a single source of truth.

pub mod settings;

pub use settings::{default_path, LogSettings, Settings, WriteSettings};
