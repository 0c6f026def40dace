//! Core library for nbline.
//!
//! Provides the typed notebook model, the nbformat 4 reader and writer (with
//! upgrades from older layouts), the line-oriented renderer used by `nbview`,
//! and the logging subsystem shared by both binaries.

pub mod format;
pub mod logging;
pub mod notebook;
pub mod render;
pub mod upgrade;

pub use notebook::{Cell, CellKind, MultilineText, Notebook, Output};
