//! Shared error type for external capabilities.
//!
//! Detectors, text extractors, vision providers, input drivers and code
//! executors all sit behind traits. A backend that is not installed or not
//! configured reports `Unavailable`, which callers handle as its own branch
//! rather than as a generic failure.

use std::time::Duration;
use thiserror::Error;

/// Errors returned across a capability seam.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CapabilityError {
    #[error("Capability unavailable: {0}")]
    Unavailable(String),

    #[error("Capability failed: {0}")]
    Failed(String),

    #[error("Capability timed out after {0:?}")]
    Timeout(Duration),
}

impl CapabilityError {
    /// Whether this error means the backend is absent rather than broken.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Result type for capability calls.
pub type CapabilityResult<T> = Result<T, CapabilityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_is_distinct() {
        assert!(CapabilityError::Unavailable("ocr".into()).is_unavailable());
        assert!(!CapabilityError::Failed("boom".into()).is_unavailable());
        assert!(!CapabilityError::Timeout(Duration::from_secs(1)).is_unavailable());
    }
}
