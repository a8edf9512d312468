// src/core/protocol/mod.rs

//! The RESP (REdis Serialization Protocol) wire layer: a low-level `RespFrame`
//! with its `tokio_util::codec` Encoder/Decoder, and `RespValue`, the simplified
//! value type the command layer produces.

mod resp_frame;
pub mod resp_value;

pub use resp_frame::{RespFrame, RespFrameCodec};
pub use resp_value::RespValue;
