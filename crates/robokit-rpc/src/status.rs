/*!
 * Error status carried in RPC replies.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

use robokit_components::error::ComponentError;

pub use robokit_components::error::Code;

/// A failed call: a code plus a human readable detail
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status code
    pub code: Code,
    /// Detail text, delivered to the caller unchanged
    pub message: String,
}

impl Status {
    /// Create a status
    pub fn new<S: Into<String>>(code: Code, message: S) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A `NotFound` status
    pub fn not_found<S: Into<String>>(message: S) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// An `InvalidArgument` status
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// An `Unimplemented` status
    pub fn unimplemented<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    /// An `Internal` status
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::new(Code::Internal, message)
    }

    /// Turn the status back into an error on the calling side
    pub fn into_error(self) -> ComponentError {
        ComponentError::from_status(self.code, self.message)
    }
}

impl From<&ComponentError> for Status {
    fn from(err: &ComponentError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

impl From<ComponentError> for Status {
    fn from(err: ComponentError) -> Self {
        Status::from(&err)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_errors_keep_their_text() {
        let status = Status::from(ComponentError::not_found("generic sensor", "sensor4"));
        assert_eq!(status.code, Code::NotFound);
        assert_eq!(status.message, "no generic sensor named sensor4");

        let err = status.into_error();
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "no generic sensor named sensor4");
    }

    #[test]
    fn test_domain_error_round_trip() {
        let status = Status::from(ComponentError::domain("can't get readings"));
        assert_eq!(status.code, Code::Unknown);
        let err = status.into_error();
        assert!(matches!(err, ComponentError::Remote { code: Code::Unknown, .. }));
        assert_eq!(err.to_string(), "can't get readings");
    }

    #[test]
    fn test_deadline_maps_back() {
        let status = Status::from(ComponentError::DeadlineExceeded);
        assert!(matches!(status.into_error(), ComponentError::DeadlineExceeded));
    }

    #[test]
    fn test_serde_shape() {
        let json = serde_json::to_string(&Status::unimplemented("nope")).unwrap();
        assert_eq!(json, r#"{"code":"unimplemented","message":"nope"}"#);
    }
}
