use thiserror::Error;

use crate::backend::Address;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Transfer at address {address:#x} ({len} bytes) incomplete: {failed_chunks} chunk(s) failed")]
    Incomplete {
        address: Address,
        len: usize,
        failed_chunks: usize,
    },

    #[error("Memory at address {address:#x} ({len} bytes) does not hold the expected content")]
    UnexpectedContent { address: Address, len: usize },

    #[error("Expected content is {actual} bytes, transfer covers {expected} bytes")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Invalid hex string: {0}")]
    InvalidHex(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is a failed content guard (nothing was written)
    pub fn is_unexpected_content(&self) -> bool {
        matches!(self, Error::UnexpectedContent { .. })
    }

    /// Check if this error is a partially failed transfer
    pub fn is_incomplete(&self) -> bool {
        matches!(self, Error::Incomplete { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_predicates() {
        let guard = Error::UnexpectedContent {
            address: 0x1000,
            len: 4,
        };
        assert!(guard.is_unexpected_content());
        assert!(!guard.is_incomplete());

        let partial = Error::Incomplete {
            address: 0x1000,
            len: 4,
            failed_chunks: 1,
        };
        assert!(partial.is_incomplete());
        assert!(!partial.is_unexpected_content());
    }

    #[test]
    fn test_error_messages_show_hex_address() {
        let err = Error::Incomplete {
            address: 0xDEAD0000,
            len: 16,
            failed_chunks: 2,
        };
        assert_eq!(
            err.to_string(),
            "Transfer at address 0xdead0000 (16 bytes) incomplete: 2 chunk(s) failed"
        );
    }
}
