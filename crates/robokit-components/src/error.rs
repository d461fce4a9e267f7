/*!
 * Error types for component operations.
 *
 * Every component call, local or remote, fails with a `ComponentError`. Each
 * variant maps onto a wire status `Code` so that the RPC layer can carry it
 * across a connection and rebuild an equivalent error on the other side.
 */
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use robokit_core::error::Error as CoreError;

/// Status codes carried on the wire with a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    /// The call was cancelled by the caller
    Cancelled,
    /// Unclassified failure, used for driver errors
    Unknown,
    /// The request was malformed
    InvalidArgument,
    /// The call's deadline passed
    DeadlineExceeded,
    /// No resource with the requested name
    NotFound,
    /// A resource with that name already exists
    AlreadyExists,
    /// The resource exists but cannot serve this call
    FailedPrecondition,
    /// The operation is not supported
    Unimplemented,
    /// Internal invariant broken
    Internal,
    /// The connection is unusable
    Unavailable,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Code::Cancelled => "cancelled",
            Code::Unknown => "unknown",
            Code::InvalidArgument => "invalid argument",
            Code::DeadlineExceeded => "deadline exceeded",
            Code::NotFound => "not found",
            Code::AlreadyExists => "already exists",
            Code::FailedPrecondition => "failed precondition",
            Code::Unimplemented => "unimplemented",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// Error type for component operations
#[derive(Error, Debug)]
pub enum ComponentError {
    /// No resource registered under the name
    #[error("no {subtype} named {name}")]
    ResourceNotFound {
        /// Human label of the requested subtype
        subtype: String,
        /// The requested instance name
        name: String,
    },

    /// A resource exists under the name but is not of the requested kind
    #[error("{name} is not a {subtype}")]
    WrongSubtype {
        /// Human label of the requested subtype
        subtype: String,
        /// The requested instance name
        name: String,
    },

    /// A reconfiguration was attempted with a wrapper of another kind
    #[error("expected new resource to be {expected} but got {actual}")]
    TypeMismatch {
        /// Wrapper type that was expected
        expected: String,
        /// Wrapper type that was supplied
        actual: String,
    },

    /// Two resources share one name
    #[error("duplicate resource name {0}")]
    DuplicateResource(String),

    /// A resource name could not be parsed
    #[error("invalid resource name: {0}")]
    InvalidName(String),

    /// A request could not be understood
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Driver failure; the message is kept verbatim
    #[error("{0}")]
    Domain(String),

    /// The driver does not support the operation
    #[error("{0}")]
    Unsupported(String),

    /// The call context was cancelled
    #[error("context canceled")]
    Cancelled,

    /// The call context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The connection was closed before or during the call
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection failed
    #[error("transport error: {0}")]
    Transport(String),

    /// Failure reported by the remote side; the message is kept verbatim
    #[error("{message}")]
    Remote {
        /// Status code sent by the remote side
        code: Code,
        /// Status detail sent by the remote side
        message: String,
    },

    /// Core error
    #[error("Core error: {0}")]
    Core(CoreError),
}

/// Result type for component operations
pub type Result<T> = std::result::Result<T, ComponentError>;

impl ComponentError {
    /// Create a new driver error
    pub fn domain<S: AsRef<str>>(msg: S) -> Self {
        ComponentError::Domain(msg.as_ref().to_string())
    }

    /// Create a new unsupported-operation error
    pub fn unsupported<S: AsRef<str>>(msg: S) -> Self {
        ComponentError::Unsupported(msg.as_ref().to_string())
    }

    /// Create a new invalid-argument error
    pub fn invalid_argument<S: AsRef<str>>(msg: S) -> Self {
        ComponentError::InvalidArgument(msg.as_ref().to_string())
    }

    /// Create a new transport error
    pub fn transport<S: AsRef<str>>(msg: S) -> Self {
        ComponentError::Transport(msg.as_ref().to_string())
    }

    /// Create a new not-found error
    pub fn not_found<S: AsRef<str>, N: AsRef<str>>(subtype: S, name: N) -> Self {
        ComponentError::ResourceNotFound {
            subtype: subtype.as_ref().to_string(),
            name: name.as_ref().to_string(),
        }
    }

    /// Create a new wrong-subtype error
    pub fn wrong_subtype<S: AsRef<str>, N: AsRef<str>>(subtype: S, name: N) -> Self {
        ComponentError::WrongSubtype {
            subtype: subtype.as_ref().to_string(),
            name: name.as_ref().to_string(),
        }
    }

    /// Rebuild an error from a wire status
    pub fn from_status<S: Into<String>>(code: Code, message: S) -> Self {
        match code {
            Code::Cancelled => ComponentError::Cancelled,
            Code::DeadlineExceeded => ComponentError::DeadlineExceeded,
            code => ComponentError::Remote {
                code,
                message: message.into(),
            },
        }
    }

    /// The wire status code for this error
    pub fn code(&self) -> Code {
        match self {
            ComponentError::ResourceNotFound { .. } => Code::NotFound,
            ComponentError::WrongSubtype { .. } => Code::FailedPrecondition,
            ComponentError::TypeMismatch { .. }
            | ComponentError::InvalidName(_)
            | ComponentError::InvalidArgument(_) => Code::InvalidArgument,
            ComponentError::DuplicateResource(_) => Code::AlreadyExists,
            ComponentError::Domain(_) => Code::Unknown,
            ComponentError::Unsupported(_) => Code::Unimplemented,
            ComponentError::Cancelled => Code::Cancelled,
            ComponentError::DeadlineExceeded => Code::DeadlineExceeded,
            ComponentError::ConnectionClosed | ComponentError::Transport(_) => Code::Unavailable,
            ComponentError::Remote { code, .. } => *code,
            ComponentError::Core(_) => Code::Internal,
        }
    }

    /// Whether the resource was missing, locally or on the remote side
    pub fn is_not_found(&self) -> bool {
        self.code() == Code::NotFound
    }

    /// Whether the call ended because its context finished
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ComponentError::Cancelled | ComponentError::DeadlineExceeded
        )
    }
}

impl From<CoreError> for ComponentError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Cancelled => ComponentError::Cancelled,
            CoreError::DeadlineExceeded => ComponentError::DeadlineExceeded,
            other => ComponentError::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ComponentError::not_found("generic sensor", "sensor4");
        assert_eq!(err.to_string(), "no generic sensor named sensor4");
        assert!(err.is_not_found());

        let err = ComponentError::wrong_subtype("generic sensor", "sensor3");
        assert_eq!(err.to_string(), "sensor3 is not a generic sensor");
        assert_eq!(err.code(), Code::FailedPrecondition);

        let err = ComponentError::domain("can't get readings");
        assert_eq!(err.to_string(), "can't get readings");
        assert_eq!(err.code(), Code::Unknown);
    }

    #[test]
    fn test_status_round_trip_keeps_message() {
        let original = ComponentError::not_found("servo", "servo9");
        let rebuilt = ComponentError::from_status(original.code(), original.to_string());
        assert_eq!(rebuilt.to_string(), original.to_string());
        assert!(rebuilt.is_not_found());

        let rebuilt = ComponentError::from_status(Code::Cancelled, "ignored");
        assert!(matches!(rebuilt, ComponentError::Cancelled));
    }

    #[test]
    fn test_core_cancellation_maps_to_component_cancellation() {
        assert!(matches!(
            ComponentError::from(CoreError::Cancelled),
            ComponentError::Cancelled
        ));
        assert!(ComponentError::from(CoreError::DeadlineExceeded).is_cancellation());
        assert_eq!(
            ComponentError::from(CoreError::other("boom")).code(),
            Code::Internal
        );
    }

    #[test]
    fn test_code_serializes_snake_case() {
        let json = serde_json::to_string(&Code::FailedPrecondition).unwrap();
        assert_eq!(json, r#""failed_precondition""#);
    }
}
