use thiserror::Error;

/// Errors produced while encoding or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// A message could not be encoded.
    #[error("encoding error: {reason}")]
    Encoding { reason: String },

    /// A byte sequence is not a valid message.
    #[error("decoding error: {reason}")]
    Decoding { reason: String },

    /// Message exceeds the maximum allowed size.
    #[error("message too large: {size} bytes (max {max})")]
    MessageTooLarge { size: usize, max: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decoding_error_display() {
        let err = CodecError::Decoding {
            reason: "unexpected end of input".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "decoding error: unexpected end of input"
        );
    }

    #[test]
    fn test_too_large_display() {
        let err = CodecError::MessageTooLarge { size: 10, max: 4 };
        assert!(err.to_string().contains("10 bytes (max 4)"));
    }
}
