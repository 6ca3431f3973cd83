//! Wire Codec
//!
//! MessagePack encoding and decoding for the feed's tagged-record schema.
//! Frames are MessagePack maps with string keys (named fields), so the
//! discriminant can be read before the payload is interpreted.
//!
//! A decode failure is scoped to the frame that caused it: the caller logs
//! and drops the frame, the connection is never torn down over it.

use serde::Serialize;

use super::messages::FeedFrame;
use crate::domain::streaming::WireRequest;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// `MessagePack` encoding failed.
    #[error("encode error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// `MessagePack` decoding failed.
    #[error("decode error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    /// The frame decoded as a value but not as a known envelope.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
}

/// `MessagePack` codec for the feed wire format.
#[derive(Debug, Default, Clone)]
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Create a new codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode an outbound request as a named-field `MessagePack` map.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails (should not happen with
    /// valid data).
    pub fn encode_request(&self, request: &WireRequest) -> Result<Vec<u8>, CodecError> {
        self.encode_named(request)
    }

    /// Encode any value as a named-field `MessagePack` map.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_named<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode one inbound frame.
    ///
    /// Reads the `kind` discriminant and then the matching payload shape.
    /// When the bytes parse as a `MessagePack` value but not as a known
    /// envelope, the error names what was actually there to make dropped
    /// frames diagnosable from logs.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed bytes or unknown frame kinds.
    pub fn decode_frame(&self, data: &[u8]) -> Result<FeedFrame, CodecError> {
        match rmp_serde::from_slice::<FeedFrame>(data) {
            Ok(frame) => Ok(frame),
            Err(err) => {
                // Inspect the raw value so the log line can say what the
                // frame actually was.
                let mut cursor = std::io::Cursor::new(data);
                if let Ok(value) = rmpv::decode::read_value(&mut cursor) {
                    return Err(CodecError::InvalidFrame(format!(
                        "unrecognized envelope: {value}"
                    )));
                }
                Err(err.into())
            }
        }
    }
}
