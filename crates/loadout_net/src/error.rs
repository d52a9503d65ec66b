//! Replication error types

use thiserror::Error;

/// Errors surfaced while decoding replicated payloads.
///
/// Every variant here is a protocol error: the stream is considered
/// corrupt and the update it came from must be discarded. Logical no-ops
/// (unknown item ids, empty updates) are not errors and never reach this
/// type.
#[derive(Debug, Error)]
pub enum NetError {
    /// Type index not present in the local registry
    #[error("unknown payload type index {0}")]
    UnknownTypeIndex(u8),
    /// Stream ended before the requested bits
    #[error("bit stream overrun at bit {at}")]
    StreamOverrun {
        /// Bit position of the failed read
        at: usize,
    },
    /// Delta-encoded payload arrived without a usable baseline
    #[error("delta payload without a baseline state")]
    MissingBaseline,
    /// String payload was not valid UTF-8
    #[error("malformed string in payload")]
    MalformedString,
    /// Decoded payload failed its own validation
    #[error("payload of type {0:?} failed validation")]
    InvalidPayload(&'static str),
}
