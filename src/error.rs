//! Error types for the IRC client engine.
//!
//! This module defines configuration errors (raised before any I/O),
//! line-level protocol violations (the line is dropped, the session goes on)
//! and session-fatal transport errors.

use thiserror::Error;

/// Convenience type alias for Results using [`ClientError`].
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Top-level client errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The configuration cannot be used. Raised before any network action.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O error on the underlying stream.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake failed.
    #[error("tls error: {0}")]
    Tls(String),

    /// The server closed the connection.
    #[error("connection closed")]
    ConnectionClosed,

    /// A connect or negotiation step did not finish in time.
    #[error("timed out while {0}")]
    Timeout(&'static str),

    /// An operation needed a live connection but there is none.
    #[error("not connected")]
    NotConnected,

    /// The outbound writer is gone; the line was not sent.
    #[error("send failed: writer has shut down")]
    SendFailed,
}

impl ClientError {
    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Tls(_) | Self::ConnectionClosed | Self::SendFailed
        )
    }
}

/// Errors in the client configuration.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigError {
    /// The SASL mechanism is not one this client can drive.
    #[error("SASL mechanism '{0}' is not supported")]
    UnsupportedMechanism(String),

    /// A credential needed by the chosen mechanism is missing.
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),

    /// SASL EXTERNAL needs a TLS connection to present a certificate.
    #[error("SASL EXTERNAL requires TLS")]
    ExternalRequiresTls,

    /// The TLS identity could not be read or parsed.
    #[error("invalid TLS identity: {0}")]
    InvalidIdentity(String),

    /// A required field is empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

/// A prefixed line that cannot be split into actor, command and target.
///
/// These are dropped by the dispatcher; they never end the session.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum LineParseError {
    /// The line was empty.
    #[error("empty line")]
    Empty,

    /// The prefix marker was not followed by an actor.
    #[error("missing actor after prefix marker")]
    MissingActor,

    /// Only a prefix was present.
    #[error("missing command after prefix")]
    MissingCommand,

    /// The command had no target token.
    #[error("missing target for {0}")]
    MissingTarget(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::Config(ConfigError::UnsupportedMechanism("CRAM-MD5".into()));
        assert_eq!(
            err.to_string(),
            "configuration error: SASL mechanism 'CRAM-MD5' is not supported"
        );

        let err = LineParseError::MissingTarget("PRIVMSG".into());
        assert_eq!(err.to_string(), "missing target for PRIVMSG");
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: ClientError = io_err.into();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(err.is_fatal());

        let err: ClientError = ConfigError::ExternalRequiresTls.into();
        assert!(!err.is_fatal());
    }
}
