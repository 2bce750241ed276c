/*!
Error types for transceiver EEPROM access.
*/

use crate::field::{ModuleFamily, Page, SffField};
use thiserror::Error;

/// Common result type used throughout the sff library
pub type Result<T> = std::result::Result<T, SffError>;

/// Every failure mode of the registry, the page cache and the driver
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SffError {
    /// The field has no entry in the active family's table
    #[error("field {field:?} is not defined for {family:?} modules")]
    UnknownField { field: SffField, family: ModuleFamily },

    /// A field location does not fit inside its page
    #[error("read of {length} bytes at offset {offset} exceeds {page:?} page")]
    OutOfBounds {
        page: Page,
        offset: usize,
        length: usize,
    },

    /// The module is absent or the cache has not been refreshed since insertion
    #[error("transceiver is not present or its cached data is stale")]
    StaleData,

    /// Bus fault reported by the transport
    #[error("transport error: {0}")]
    Transport(String),

    /// The module (or the field itself) does not provide the requested value
    #[error("field {field:?} unsupported: {reason}")]
    UnsupportedField { field: SffField, reason: String },

    /// Alarm/warning thresholds live on page 3, which this module does not expose
    #[error("threshold data unavailable (flat memory or page 3 not read)")]
    ThresholdsUnavailable,

    /// Refresh was requested for a module that is not plugged in
    #[error("transceiver is not present")]
    NotPresent,

    /// The module reports its data-not-ready status bit
    #[error("transceiver data is not ready")]
    DataNotReady,

    /// The page was never populated by a refresh
    #[error("{0:?} page has not been read")]
    PageUnavailable(Page),

    /// A field table entry cannot be used for the requested operation
    #[error("invalid field layout: {0}")]
    InvalidLayout(String),
}

impl SffError {
    /// Create a new transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a new unsupported field error
    pub fn unsupported(field: SffField, reason: impl Into<String>) -> Self {
        Self::UnsupportedField {
            field,
            reason: reason.into(),
        }
    }

    /// Create a new invalid layout error
    pub fn invalid_layout(msg: impl Into<String>) -> Self {
        Self::InvalidLayout(msg.into())
    }

    /// Whether a later refresh may make the same request succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StaleData | Self::Transport(_) | Self::DataNotReady | Self::NotPresent
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = SffError::transport("bus stuck");
        assert_eq!(e.to_string(), "transport error: bus stuck");

        let e = SffError::OutOfBounds {
            page: Page::Page0,
            offset: 120,
            length: 16,
        };
        assert_eq!(e.to_string(), "read of 16 bytes at offset 120 exceeds Page0 page");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(SffError::StaleData.is_retryable());
        assert!(SffError::transport("nack").is_retryable());
        assert!(!SffError::ThresholdsUnavailable.is_retryable());
        assert!(!SffError::UnknownField {
            field: SffField::Wavelength,
            family: ModuleFamily::Qsfp,
        }
        .is_retryable());
    }
}
