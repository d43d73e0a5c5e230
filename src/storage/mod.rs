//! Storage layer for chanfind
//!
//! The backend seam, an in-memory backend, the persisted document shapes,
//! and typed collections over backend indices.

pub mod backend;
pub mod collection;
pub mod document;
pub mod memory;
