//! Error types for the laptop catalog service.
//!
//! This module defines the central `Error` enum, a closed set of outcomes that
//! every handler and store reports through. It implements `From<Error>` for
//! `tonic::Status` so handlers can propagate failures to gRPC clients with
//! the appropriate status code.
//!
//! ## Error Cases
//! - `InvalidArgument`: Malformed identifier or request payload.
//! - `AlreadyExists`: A laptop with the same identifier is already stored.
//! - `NotFound`: A referenced laptop does not exist.
//! - `PayloadTooLarge`: An uploaded blob exceeded the configured maximum.
//! - `RequestCancelled` / `DeadlineExceeded`: The call context expired.
//! - `Internal`: Unexpected store or I/O failure, with operation context.
//! - `Protocol`: The client broke the streaming message sequence.
//! - `ChannelError`: Internal communication failure between tasks.
//! - `ServiceShutdown`: A call arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the laptop catalog service.
#[derive(Clone, thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The request was malformed.
    #[error("Invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A laptop with this identifier is already stored.
    #[error("Laptop {id} already exists")]
    AlreadyExists { id: String },

    /// The referenced laptop is not stored.
    #[error("Laptop {id} not found")]
    NotFound { id: String },

    /// Accumulated blob payload exceeded the maximum size.
    #[error("Payload of {size} bytes exceeds maximum of {max} bytes")]
    PayloadTooLarge { size: usize, max: usize },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The deadline supplied by the client passed.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Unexpected store or I/O failure.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The inbound stream did not follow the expected message sequence.
    #[error("Protocol error: {reason}")]
    Protocol { reason: String },

    /// Internal channel send/receive failure (e.g., closed or full channel).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Returns `true` for outcomes caused by the call context rather than by
    /// the request itself.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::RequestCancelled | Self::DeadlineExceeded)
    }

    /// Wraps anything that is not already a business or cancellation outcome
    /// as `Internal`, prefixed with the failing operation.
    pub fn into_internal(self, operation: &str) -> Self {
        match self {
            Self::Internal { context } => Self::Internal {
                context: format!("{operation}: {context}"),
            },
            Self::ChannelError { context } => Self::Internal {
                context: format!("{operation}: {context}"),
            },
            Self::Protocol { reason } => Self::Internal {
                context: format!("{operation}: {reason}"),
            },
            other => other,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            context: err.to_string(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidArgument { reason } => Status::invalid_argument(reason),
            Error::AlreadyExists { id } => {
                Status::already_exists(format!("Laptop {id} already exists"))
            }
            Error::NotFound { id } => Status::not_found(format!("Laptop {id} not found")),
            Error::PayloadTooLarge { size, max } => Status::invalid_argument(format!(
                "Image is too large: {size} bytes exceeds {max} bytes"
            )),
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::DeadlineExceeded => Status::deadline_exceeded("Deadline is exceeded"),
            Error::Internal { context } => Status::internal(context),
            Error::Protocol { reason } => Status::unknown(reason),
            Error::ChannelError { context } => {
                Status::internal(format!("Channel error: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
