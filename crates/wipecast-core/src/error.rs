//! Core error types for Wipecast.

/// A specialized Result type for Wipecast operations.
pub type WipecastResult<T> = Result<T, WipecastError>;

/// Top-level error type encompassing all Wipecast subsystems.
#[derive(Debug, thiserror::Error)]
pub enum WipecastError {
    /// The source is not a loadable raster image.
    #[error("decode error: {message} ({origin})")]
    Decode { message: String, origin: String },

    /// Wrong MIME type or over the size limit, caught before decoding.
    #[error("unsupported file: {0}")]
    UnsupportedFile(String),

    /// No supported container format on this runtime.
    #[error("recorder unavailable: {0}")]
    RecorderUnavailable(String),

    /// The encoder failed while a session was running.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A remote store rejected a read or write.
    #[error("permission denied: {operation} on {path}")]
    Permission { operation: String, path: String },

    /// The AI service was unavailable or returned an incomplete result.
    #[error("remote service error: {0}")]
    RemoteService(String),

    /// The identity provider rejected the credentials or request.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("recorder busy: a session is already {0}")]
    RecorderBusy(String),

    #[error("no recording in progress")]
    NotRecording,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl WipecastError {
    /// Create a decode error for the given source.
    pub fn decode(message: impl Into<String>, origin: impl Into<String>) -> Self {
        WipecastError::Decode {
            message: message.into(),
            origin: origin.into(),
        }
    }

    /// Create a permission error for an operation on a store path.
    pub fn permission(operation: impl Into<String>, path: impl Into<String>) -> Self {
        WipecastError::Permission {
            operation: operation.into(),
            path: path.into(),
        }
    }

    /// Map an IO error from a store operation, keeping permission failures distinct.
    pub fn from_store_io(
        err: std::io::Error,
        operation: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        if err.kind() == std::io::ErrorKind::PermissionDenied {
            Self::permission(operation, path)
        } else {
            WipecastError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_display() {
        let err = WipecastError::decode("not a PNG", "before.png");
        assert_eq!(err.to_string(), "decode error: not a PNG (before.png)");
    }

    #[test]
    fn test_permission_error_display() {
        let err = WipecastError::permission("create", "users/abc/comparisons");
        assert_eq!(
            err.to_string(),
            "permission denied: create on users/abc/comparisons"
        );
    }

    #[test]
    fn test_store_io_keeps_permission_distinct() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert!(matches!(
            WipecastError::from_store_io(denied, "create", "x"),
            WipecastError::Permission { .. }
        ));

        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(matches!(
            WipecastError::from_store_io(missing, "create", "x"),
            WipecastError::Io(_)
        ));
    }
}
