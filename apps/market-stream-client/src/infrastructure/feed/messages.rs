//! Feed Wire Frames
//!
//! Inbound frame envelope for the vendor's binary schema: a self-describing
//! tagged record. Decoding reads the `kind` discriminant first and then the
//! payload shape that matches it.
//!
//! # Frame Kinds
//!
//! - `tick`: market data, a mapping from instrument key to tier payload
//! - `ack`: server acknowledgment of an outbound request
//! - `error`: server-reported error with code and message
//!
//! Outbound requests ([`crate::domain::streaming::WireRequest`]) are their
//! own envelope and do not use this type.

use serde::{Deserialize, Serialize};

use crate::domain::streaming::FeedMessage;

/// Server acknowledgment of an outbound request.
///
/// # Wire Format (MessagePack map)
/// ```json
/// {"kind": "ack", "requestId": "7f6b1c1e-..."}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckFrame {
    /// Request id being acknowledged.
    #[serde(rename = "requestId")]
    pub request_id: String,
}

/// Server-reported error.
///
/// # Wire Format (MessagePack map)
/// ```json
/// {"kind": "error", "code": 429, "msg": "subscription limit exceeded"}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorFrame {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub msg: String,
}

impl std::fmt::Display for ErrorFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "feed error {}: {}", self.code, self.msg)
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeedFrame {
    /// Market data frame.
    Tick(FeedMessage),
    /// Request acknowledgment.
    Ack(AckFrame),
    /// Server error.
    Error(ErrorFrame),
}
