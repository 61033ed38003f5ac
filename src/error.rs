//! Error types and handling for sigfs

/// Result type alias for sigfs operations
pub type Result<T> = std::result::Result<T, SigfsError>;

/// Error types for the signal filesystem.
///
/// The user-visible variants carry an errno mapping so the FUSE bridge can
/// surface them on kernel replies; everything else is reported during
/// startup or treated as a programmer error.
#[derive(Debug, thiserror::Error)]
pub enum SigfsError {
    /// I/O related errors (config files, mount setup)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Invalid parameters or malformed configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Configuration could not be parsed or validated
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// A name was looked up in a directory and is absent
    #[error("Entry not found: {name}")]
    NotFound { name: String },

    /// A directory operation targeted a file inode
    #[error("Not a directory: {name}")]
    NotADirectory { name: String },

    /// A file operation targeted a directory inode
    #[error("Is a directory: {name}")]
    IsADirectory { name: String },

    /// Effective access lacks the requested mode
    #[error("Permission denied: {name}")]
    PermissionDenied { name: String },

    /// A byte stream is not a clean sequence of framed records
    #[error("Invalid record stream: {message}")]
    InvalidRecord { message: String },

    /// An in-flight blocking read was interrupted
    #[error("Interrupted")]
    Interrupted,
}

impl SigfsError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an entry-not-found error
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Create a not-a-directory error
    pub fn not_a_directory(name: impl Into<String>) -> Self {
        Self::NotADirectory { name: name.into() }
    }

    /// Create an is-a-directory error
    pub fn is_a_directory(name: impl Into<String>) -> Self {
        Self::IsADirectory { name: name.into() }
    }

    /// Create a permission-denied error
    pub fn permission_denied(name: impl Into<String>) -> Self {
        Self::PermissionDenied { name: name.into() }
    }

    /// Create an invalid record stream error
    pub fn invalid_record(message: impl Into<String>) -> Self {
        Self::InvalidRecord {
            message: message.into(),
        }
    }

    /// The errno value reported to the kernel for this error
    pub fn errno(&self) -> i32 {
        match self {
            Self::Io { .. } => libc::EIO,
            Self::InvalidParameter { .. } => libc::EINVAL,
            Self::Config { .. } => libc::EINVAL,
            Self::NotFound { .. } => libc::ENOENT,
            Self::NotADirectory { .. } => libc::ENOTDIR,
            Self::IsADirectory { .. } => libc::EISDIR,
            Self::PermissionDenied { .. } => libc::EACCES,
            Self::InvalidRecord { .. } => libc::EINVAL,
            Self::Interrupted => libc::EINTR,
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for SigfsError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<serde_json::Error> for SigfsError {
    fn from(err: serde_json::Error) -> Self {
        Self::config(format!("JSON error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = SigfsError::not_found("vehicle_speed");
        assert!(matches!(err, SigfsError::NotFound { .. }));

        let err = SigfsError::invalid_parameter("queue_length", "must be a power of 2");
        assert!(matches!(err, SigfsError::InvalidParameter { .. }));
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(SigfsError::not_found("x").errno(), libc::ENOENT);
        assert_eq!(SigfsError::not_a_directory("x").errno(), libc::ENOTDIR);
        assert_eq!(SigfsError::is_a_directory("x").errno(), libc::EISDIR);
        assert_eq!(SigfsError::permission_denied("x").errno(), libc::EACCES);
        assert_eq!(SigfsError::invalid_record("x").errno(), libc::EINVAL);
        assert_eq!(SigfsError::Interrupted.errno(), libc::EINTR);
    }

    #[test]
    fn test_error_display() {
        let err = SigfsError::permission_denied("engine_rpm");
        let display = format!("{}", err);
        assert!(display.contains("Permission denied"));
        assert!(display.contains("engine_rpm"));
    }
}
