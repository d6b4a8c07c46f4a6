//! Error types surfaced by the injection runtime.

use std::io;

use thiserror::Error;

/// Errors raised while validating or resolving an injection target.
///
/// Configuration errors are detected before any I/O and are fatal to the
/// test being configured. Resolution errors abort the single test invocation
/// that triggered them. I/O failures wrap their source unchanged; nothing is
/// swallowed or retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InjectError {
    /// Raised when annotations on a target contradict each other or the
    /// target type cannot be injected.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the offending configuration.
        message: String,
    },
    /// Raised when computing the value for a parameter fails at test time.
    #[error("parameter resolution error: {message}")]
    ParameterResolution {
        /// Description of the failed resolution.
        message: String,
    },
    /// Raised when the requested resource does not exist at any candidate
    /// location.
    #[error("resource not found: {path}")]
    ResourceNotFound {
        /// Path exactly as requested by the annotation.
        path: String,
    },
    /// Raised when reading a resource fails partway through.
    #[error("failed to read resource {path}: {source}")]
    Io {
        /// Path of the resource being read.
        path: String,
        /// Root cause reported by the underlying stream.
        #[source]
        source: io::Error,
    },
    /// Raised when an encoding label is not recognised.
    #[error("unknown encoding label '{label}'")]
    UnknownEncoding {
        /// Label exactly as configured.
        label: String,
    },
    /// Raised when a capture backend is requested but not present in this
    /// build or environment.
    #[error("capture backend '{name}' is unavailable")]
    BackendUnavailable {
        /// Name of the requested backend.
        name: String,
    },
}

impl InjectError {
    /// Construct a configuration error from a message.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Construct a parameter-resolution error from a message.
    pub fn resolution(message: impl Into<String>) -> Self {
        Self::ParameterResolution {
            message: message.into(),
        }
    }

    /// Return `true` when the error was detected during eager validation.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::InjectError;

    #[test]
    fn display_includes_requested_path() {
        let err = InjectError::ResourceNotFound {
            path: String::from("data/missing.txt"),
        };
        assert!(err.to_string().contains("data/missing.txt"));
    }

    #[test]
    fn io_errors_keep_their_source() {
        let source = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = InjectError::Io {
            path: String::from("data/partial.bin"),
            source,
        };
        let rendered = err.to_string();
        assert!(rendered.contains("data/partial.bin"));
        assert!(rendered.contains("short read"));
    }
}
