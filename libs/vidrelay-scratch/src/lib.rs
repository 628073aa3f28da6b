//! # VidRelay Scratch Adapter
//!
//! Implements the `ScratchStore` port of the domain layer on the local
//! filesystem: one scratch file per transfer, written through a buffered
//! writer task.

pub mod infrastructure;

pub use infrastructure::{FileSink, FsScratchStore};
