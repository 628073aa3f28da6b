//! Wire types of the client protocol and the operational endpoints

pub mod frame;
pub mod messages;
