//! Header checks applied to frames received from the server.
//!
//! Runs on the raw header before the payload is buffered, so oversized
//! frames are rejected without reading them.

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::frame::FrameHeader;

/// Validates incoming server frame headers.
#[derive(Debug, Clone)]
pub struct FrameValidator {
    limits: Limits,
}

impl FrameValidator {
    /// Create a validator enforcing `limits`.
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// Validate a decoded header.
    ///
    /// # Errors
    ///
    /// - `Error::MaskedServerFrame` - servers must not mask (RFC 6455 Section 5.1)
    /// - `Error::ReservedBitsSet` - RSV bits without a negotiated extension
    /// - `Error::FrameTooLarge` - payload exceeds `max_frame_size`
    pub fn validate_incoming(&self, header: &FrameHeader) -> Result<()> {
        if header.mask.is_some() {
            return Err(Error::MaskedServerFrame);
        }
        if header.rsv != 0 {
            return Err(Error::ReservedBitsSet);
        }
        self.limits.check_frame_size(header.payload_len)
    }
}
