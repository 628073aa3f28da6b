//! Infrastructure adapters for S3-compatible object storage

mod s3_remote_store;

pub use s3_remote_store::{
    S3RemoteSink, S3RemoteStore, DEFAULT_FOLDER, DEFAULT_PART_SIZE, MIN_PART_SIZE,
};
