//! Workspace error taxonomy.
//!
//! Every fallible operation in the workspace returns [`Error`], which pairs a
//! stable [`ErrorKind`] with a human-readable message and an optional cause
//! chain. Callers branch on the kind; the message is for diagnostics only.
//! Remote errors additionally carry the peer's stack so a failure on the
//! other side of an RPC pair can be reported in full.

use std::fmt;

use thiserror::Error as ThisError;

/// Result alias used across the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error classification.
///
/// The numeric codes returned by [`ErrorKind::code`] are part of the remote
/// protocol wire format and must not be renumbered.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, ThisError)]
pub enum ErrorKind {
    /// Allocation failure.
    #[error("MemoryError")]
    Memory,
    /// Programming error: a caller violated an API contract.
    #[error("AssertError")]
    Assert,
    /// Malformed input: bad compression stream, invalid XML, bad frame.
    #[error("FormatError")]
    Format,
    /// A file could not be opened.
    #[error("FileOpenError")]
    FileOpen,
    /// A file could not be read.
    #[error("FileReadError")]
    FileRead,
    /// A file could not be written.
    #[error("FileWriteError")]
    FileWrite,
    /// A file that was expected to exist is missing.
    #[error("FileMissingError")]
    FileMissing,
    /// A file could not be removed.
    #[error("FileRemoveError")]
    FileRemove,
    /// A path could not be opened or listed.
    #[error("PathOpenError")]
    PathOpen,
    /// A path could not be created.
    #[error("PathCreateError")]
    PathCreate,
    /// A path that was expected to exist is missing.
    #[error("PathMissingError")]
    PathMissing,
    /// A path could not be removed.
    #[error("PathRemoveError")]
    PathRemove,
    /// Encryption or decryption failure, including bad padding or header.
    #[error("CryptoError")]
    Crypto,
    /// Remote peer or HTTP protocol violation.
    #[error("ProtocolError")]
    Protocol,
    /// TLS negotiation or certificate verification failure.
    #[error("TlsError")]
    Tls,
    /// An option was not valid for the operation.
    #[error("OptionInvalidError")]
    OptionInvalid,
    /// An option value was out of range or malformed.
    #[error("OptionInvalidValueError")]
    OptionInvalidValue,
    /// A required command was not supplied.
    #[error("CommandRequiredError")]
    CommandRequired,
    /// The supplied command is not valid.
    #[error("CommandInvalidError")]
    CommandInvalid,
    /// Terminated by external request.
    #[error("TermError")]
    Term,
}

impl ErrorKind {
    /// Returns the stable wire code for this kind.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Memory => 25,
            Self::Assert => 26,
            Self::Format => 27,
            Self::FileOpen => 28,
            Self::FileRead => 29,
            Self::FileWrite => 30,
            Self::FileMissing => 31,
            Self::FileRemove => 32,
            Self::PathOpen => 33,
            Self::PathCreate => 34,
            Self::PathMissing => 35,
            Self::PathRemove => 36,
            Self::Crypto => 37,
            Self::Protocol => 38,
            Self::Tls => 39,
            Self::OptionInvalid => 40,
            Self::OptionInvalidValue => 41,
            Self::CommandRequired => 42,
            Self::CommandInvalid => 43,
            Self::Term => 44,
        }
    }

    /// Looks a kind up by wire code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        Some(match code {
            25 => Self::Memory,
            26 => Self::Assert,
            27 => Self::Format,
            28 => Self::FileOpen,
            29 => Self::FileRead,
            30 => Self::FileWrite,
            31 => Self::FileMissing,
            32 => Self::FileRemove,
            33 => Self::PathOpen,
            34 => Self::PathCreate,
            35 => Self::PathMissing,
            36 => Self::PathRemove,
            37 => Self::Crypto,
            38 => Self::Protocol,
            39 => Self::Tls,
            40 => Self::OptionInvalid,
            41 => Self::OptionInvalidValue,
            42 => Self::CommandRequired,
            43 => Self::CommandInvalid,
            44 => Self::Term,
            _ => return None,
        })
    }
}

/// Error carried by every fallible operation in the workspace.
#[derive(Clone, Debug)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    cause: Option<Box<Error>>,
    stack: Vec<String>,
}

impl Error {
    /// Creates a new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            stack: Vec::new(),
        }
    }

    /// Creates a new error wrapping `cause`.
    pub fn with_cause(kind: ErrorKind, message: impl Into<String>, cause: Error) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: Some(Box::new(cause)),
            stack: Vec::new(),
        }
    }

    /// Attaches a peer stack trace, replacing any existing one.
    #[must_use]
    pub fn with_stack(mut self, stack: Vec<String>) -> Self {
        self.stack = stack;
        self
    }

    /// Convenience constructor for [`ErrorKind::Assert`].
    pub fn assert(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Assert, message)
    }

    /// Convenience constructor for [`ErrorKind::Format`].
    pub fn format(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Format, message)
    }

    /// Convenience constructor for [`ErrorKind::Protocol`].
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message)
    }

    /// Returns the error classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the human-readable message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the wrapped cause, if any.
    #[must_use]
    pub fn cause(&self) -> Option<&Error> {
        self.cause.as_deref()
    }

    /// Returns the peer stack trace; empty unless the error crossed an RPC
    /// boundary.
    #[must_use]
    pub fn stack(&self) -> &[String] {
        &self.stack
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;

        if let Some(cause) = &self.cause {
            write!(f, ": [{cause}]")?;
        }

        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|cause| cause as &dyn std::error::Error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_codes_round_trip() {
        let kinds = [
            ErrorKind::Memory,
            ErrorKind::Assert,
            ErrorKind::Format,
            ErrorKind::FileOpen,
            ErrorKind::FileRead,
            ErrorKind::FileWrite,
            ErrorKind::FileMissing,
            ErrorKind::FileRemove,
            ErrorKind::PathOpen,
            ErrorKind::PathCreate,
            ErrorKind::PathMissing,
            ErrorKind::PathRemove,
            ErrorKind::Crypto,
            ErrorKind::Protocol,
            ErrorKind::Tls,
            ErrorKind::OptionInvalid,
            ErrorKind::OptionInvalidValue,
            ErrorKind::CommandRequired,
            ErrorKind::CommandInvalid,
            ErrorKind::Term,
        ];

        for kind in kinds {
            assert_eq!(ErrorKind::from_code(kind.code()), Some(kind));
        }

        assert_eq!(ErrorKind::from_code(0), None);
        assert_eq!(ErrorKind::from_code(999), None);
    }

    #[test]
    fn display_includes_kind_and_cause() {
        let cause = Error::new(ErrorKind::FileOpen, "unable to open '/pg/base'");
        let error = Error::with_cause(ErrorKind::FileRead, "read failed", cause);

        assert_eq!(
            error.to_string(),
            "FileReadError: read failed: [FileOpenError: unable to open '/pg/base']"
        );
        assert_eq!(error.kind(), ErrorKind::FileRead);
        assert_eq!(error.cause().expect("cause set").kind(), ErrorKind::FileOpen);
    }

    #[test]
    fn stack_is_preserved() {
        let error = Error::protocol("peer terminated")
            .with_stack(vec!["cmd: open-read".into(), "storage: posix".into()]);

        assert_eq!(error.stack().len(), 2);
        assert_eq!(error.stack()[0], "cmd: open-read");
    }
}
