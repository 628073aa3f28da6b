//! # VidRelay S3 Adapter
//!
//! Implements the `RemoteStore` port of the domain layer with S3 multipart
//! uploads. Works against AWS S3 and S3-compatible stores such as MinIO
//! (configure the client with path-style addressing for the latter).

pub mod infrastructure;

pub use infrastructure::{S3RemoteSink, S3RemoteStore};
