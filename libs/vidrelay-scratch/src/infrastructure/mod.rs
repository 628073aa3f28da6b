//! Infrastructure adapters for the local scratch directory

mod fs_scratch;

pub use fs_scratch::{FileSink, FsScratchStore, DEFAULT_BUFFER_FRAGMENTS};
