//! # Storage Layer
//!
//! Blob store backends behind `st_core::traits::StorageBackend`. The engine
//! serializes its own collections; backends only move bytes.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;
