//! Shared primitives, traits, and utilities for the coexnet workspace.
//!
//! `coexnet-core` provides the foundation that all other coexnet crates build on:
//!
//! - **Error types**: [`CoexError`] and [`Result`] for structured error handling
//! - **Traits**: [`Summarizable`] one-line summaries
//! - **Memory mapping**: Zero-copy read access to finished matrix files

pub mod error;
pub mod mmap;
pub mod traits;

pub use error::{CoexError, Result};
pub use mmap::MappedFile;
pub use traits::*;
