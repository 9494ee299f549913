//! Core domain types and shared logic for the stitch upload coordinator.
//!
//! This crate defines the pieces every other crate agrees on:
//! - Upload session identity and chunk indices
//! - The blob store key scheme for chunks and merged artifacts
//! - Application configuration

pub mod config;
pub mod error;
pub mod keys;

pub use error::{Error, Result};
pub use keys::{ChunkIndex, ChunkRef, SessionRef};

/// Maximum length in bytes of a session identifier or filename after key
/// encoding. Each encoded component is a single path segment on disk.
pub const MAX_COMPONENT_LEN: usize = 255;

/// Maximum length in bytes of a full object key, including any backend prefix.
pub const MAX_KEY_LEN: usize = 1024;
