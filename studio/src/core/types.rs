//! GenStudio Core Type Definitions
//!
//! Defines fundamental types used throughout the project.

// =============================================================================
// ID Types
// =============================================================================

/// Request unique identifier (ULID)
pub type RequestId = String;

/// Creates a new request identifier
pub fn new_request_id() -> RequestId {
    ulid::Ulid::new().to_string()
}

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point)
pub type TimeSec = f64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_ids_are_unique() {
        let a = new_request_id();
        let b = new_request_id();
        assert_eq!(a.len(), 26);
        assert_ne!(a, b);
    }
}
