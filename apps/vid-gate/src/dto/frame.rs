//! Binary fragment frames
//!
//! Layout: `[u16 BE name length][name, UTF-8][u64 BE seq][payload]`.
//! The payload is everything after the header and may be empty.

use bytes::{Buf, Bytes};
use thiserror::Error;

const NAME_LEN_SIZE: usize = 2;
const SEQ_SIZE: usize = 8;

/// A decoded client fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentFrame {
    pub name: String,
    pub seq: u64,
    pub payload: Bytes,
}

/// Errors raised while decoding client frames
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("frame too short: {len} bytes, header needs at least {needed}")]
    Truncated { len: usize, needed: usize },

    #[error("object name is not valid UTF-8")]
    InvalidName,

    #[error("fragment data is not valid base64: {0}")]
    InvalidBase64(String),

    #[error("malformed control message: {0}")]
    InvalidMessage(String),
}

impl FrameError {
    /// Message safe to show to the client
    pub fn user_message(&self) -> &'static str {
        "Invalid message"
    }
}

impl FragmentFrame {
    /// Decode a binary frame; the payload is a zero-copy slice of `frame`
    pub fn decode(mut frame: Bytes) -> Result<Self, FrameError> {
        let len = frame.len();
        if len < NAME_LEN_SIZE {
            return Err(FrameError::Truncated {
                len,
                needed: NAME_LEN_SIZE + SEQ_SIZE,
            });
        }

        let name_len = frame.get_u16() as usize;
        let needed = NAME_LEN_SIZE + name_len + SEQ_SIZE;
        if len < needed {
            return Err(FrameError::Truncated { len, needed });
        }

        let name = frame.split_to(name_len);
        let name = std::str::from_utf8(&name)
            .map_err(|_| FrameError::InvalidName)?
            .to_string();
        let seq = frame.get_u64();

        Ok(Self {
            name,
            seq,
            payload: frame,
        })
    }
}
