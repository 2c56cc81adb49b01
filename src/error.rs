use crate::slurm::object::{ObjectKey, ObjectType};
use crate::slurm::rest::ApiError;
use derive_more::From;
use std::sync::Arc;
use std::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, From)]
pub enum Error {
    #[from]
    Json(serde_json::Error),

    #[from]
    Http(reqwest::Error),

    /// slurmrestd answered but reported errors in its envelope
    #[from]
    Api(ApiError),

    /// The object does not exist remotely (tolerated, ends fallback)
    NotFound {
        object_type: ObjectType,
        key: ObjectKey,
    },

    /// The remote answered with no content (tolerated, ends fallback)
    NoContent,

    /// Every configured backend version failed; the last error is last
    Exhausted(Vec<Error>),

    /// Waiting for the informer to resync took longer than allowed
    SyncTimeout {
        object_type: ObjectType,
        timeout: Duration,
    },

    /// The informer finished its resync but the remote read failed
    SyncFailed(Arc<Error>),

    /// The informer was stopped (or never started) while a caller needed it
    InformerStopped(ObjectType),

    /// The resource kind has no handler for this operation
    Unimplemented {
        object_type: ObjectType,
        operation: &'static str,
    },

    /// A value of one kind was handed to code expecting another
    TypeMismatch {
        expected: ObjectType,
        found: ObjectType,
    },

    InvalidUpdate(String),

    Config(String),

    /// Custom error message
    Custom(String),
}

impl Error {
    /// Errors that are a valid answer from the remote rather than a reason
    /// to try an older protocol version.
    #[must_use]
    pub const fn is_tolerated(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoContent)
    }

    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[must_use]
    pub fn not_found(object_type: ObjectType, key: impl Into<ObjectKey>) -> Self {
        Self::NotFound {
            object_type,
            key: key.into(),
        }
    }

    #[must_use]
    pub const fn unimplemented(object_type: ObjectType, operation: &'static str) -> Self {
        Self::Unimplemented {
            object_type,
            operation,
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, fmt: &mut core::fmt::Formatter) -> core::result::Result<(), core::fmt::Error> {
        match self {
            Self::Json(e) => write!(fmt, "json: {e}"),
            Self::Http(e) => write!(fmt, "http: {e}"),
            Self::Api(e) => write!(fmt, "{e}"),
            Self::NotFound { object_type, key } => write!(fmt, "{object_type} {key:?} not found"),
            Self::NoContent => write!(fmt, "remote returned no content"),
            Self::Exhausted(errors) => match errors.last() {
                Some(last) => write!(
                    fmt,
                    "all {} backend versions failed, last error: {last}",
                    errors.len()
                ),
                None => write!(fmt, "no backend versions configured"),
            },
            Self::SyncTimeout {
                object_type,
                timeout,
            } => write!(
                fmt,
                "timed out after {:.1}s waiting for {object_type} cache to sync",
                timeout.as_secs_f64()
            ),
            Self::SyncFailed(e) => write!(fmt, "cache sync failed: {e}"),
            Self::InformerStopped(object_type) => write!(fmt, "{object_type} informer is not running"),
            Self::Unimplemented {
                object_type,
                operation,
            } => write!(fmt, "{operation} is not implemented for {object_type}"),
            Self::TypeMismatch { expected, found } => {
                write!(fmt, "expected a {expected} but got a {found}")
            }
            Self::InvalidUpdate(msg) => write!(fmt, "invalid update: {msg}"),
            Self::Config(msg) => write!(fmt, "configuration: {msg}"),
            Self::Custom(msg) => write!(fmt, "{msg}"),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tolerated_errors() {
        assert!(Error::not_found(ObjectType::Node, "n1").is_tolerated());
        assert!(Error::NoContent.is_tolerated());
        assert!(!Error::Custom("connection refused".to_string()).is_tolerated());
        assert!(!Error::Exhausted(vec![Error::NoContent]).is_tolerated());
    }

    #[test]
    fn test_exhausted_display_names_last_error() {
        let err = Error::Exhausted(vec![
            Error::Custom("v0043 down".to_string()),
            Error::Custom("v0042 down".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("all 2 backend versions failed"));
        assert!(msg.ends_with("v0042 down"));
    }
}
