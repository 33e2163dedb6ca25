//! Error types and error handling strategy for eventrace.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Trace-format corruption fails the load; no partial state is exposed
//! - Invariant violations while building are warned and skipped
//! - Planner infeasibility is not an error (it is an absent schedule)
//! - Lookup misses return empty results, never errors
//!
//! Online-detector contract violations are not represented here at all:
//! they indicate a buggy producer and abort via panic (see
//! [`crate::online`]).

use core::fmt;
use std::io;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Trace format ===
    /// The trace file ended before a complete record was read.
    TruncatedTrace,
    /// A count or length field in the trace file is inconsistent.
    MalformedTrace,
    /// An interned-string record could not be decoded.
    MalformedStringTable,

    // === Configuration ===
    /// A configuration value is out of range or unparseable.
    InvalidConfig,

    // === I/O ===
    /// An underlying I/O operation failed.
    Io,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::TruncatedTrace | Self::MalformedTrace | Self::MalformedStringTable => {
                ErrorCategory::TraceFormat
            }
            Self::InvalidConfig => ErrorCategory::Config,
            Self::Io => ErrorCategory::Io,
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Corrupt or truncated trace input.
    TraceFormat,
    /// Invalid configuration.
    Config,
    /// Underlying I/O failure.
    Io,
}

/// The main error type for eventrace operations.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Creates a truncated-trace error naming the record being read.
    #[must_use]
    pub fn truncated(reading: impl Into<String>) -> Self {
        Self::new(ErrorKind::TruncatedTrace).with_message(format!(
            "unexpected end of trace while reading {}",
            reading.into()
        ))
    }

    /// Creates a malformed-trace error.
    #[must_use]
    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedTrace).with_message(detail)
    }

    /// Creates an invalid-config error.
    #[must_use]
    pub fn invalid_config(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfig).with_message(detail)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::new(ErrorKind::TruncatedTrace).with_source(e)
        } else {
            Self::new(ErrorKind::Io).with_source(e)
        }
    }
}

/// A specialized Result type for eventrace operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Io);
        assert_eq!(err.to_string(), "Io");
    }

    #[test]
    fn display_with_message() {
        let err = Error::malformed("arc count mismatch");
        assert_eq!(err.to_string(), "MalformedTrace: arc count mismatch");
    }

    #[test]
    fn truncated_names_the_record() {
        let err = Error::truncated("action log header");
        assert_eq!(err.kind(), ErrorKind::TruncatedTrace);
        assert!(err.to_string().contains("action log header"));
    }

    #[test]
    fn categories_match_kind() {
        assert_eq!(
            ErrorKind::TruncatedTrace.category(),
            ErrorCategory::TraceFormat
        );
        assert_eq!(
            ErrorKind::MalformedStringTable.category(),
            ErrorCategory::TraceFormat
        );
        assert_eq!(ErrorKind::InvalidConfig.category(), ErrorCategory::Config);
        assert_eq!(ErrorKind::Io.category(), ErrorCategory::Io);
    }

    #[test]
    fn eof_io_error_maps_to_truncated() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::TruncatedTrace);
        assert!(err.source().is_some());
    }

    #[test]
    fn other_io_error_maps_to_io() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
