//! SASL authentication helpers for IRC.
//!
//! Builds the credential payloads and the `AUTHENTICATE` lines that carry
//! them. Two mechanisms are driven by the client:
//!
//! - **PLAIN**: `authzid NUL authcid NUL password` (RFC 4616)
//! - **EXTERNAL**: the TLS client certificate, sent as an empty response
//!
//! # Reference
//! - IRCv3 SASL: <https://ircv3.net/specs/extensions/sasl-3.2>
//! - RFC 4616 (PLAIN): <https://tools.ietf.org/html/rfc4616>
//!
//! # Example
//!
//! ```
//! use slirc_client::sasl::{authenticate_lines, plain_token, SaslMechanism};
//!
//! let token = plain_token("alice", "alice", "secret");
//! let lines = authenticate_lines(&token);
//! assert_eq!(lines.len(), 1);
//! assert!(lines[0].starts_with("AUTHENTICATE "));
//!
//! assert_eq!(SaslMechanism::parse("plain"), SaslMechanism::Plain);
//! ```

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};

/// Maximum number of encoded characters carried by one `AUTHENTICATE` line.
pub const SASL_CHUNK_SIZE: usize = 400;

/// SASL mechanisms.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub enum SaslMechanism {
    /// PLAIN mechanism (RFC 4616) - simple username/password.
    Plain,
    /// EXTERNAL mechanism - uses TLS client certificate.
    External,
    /// Any other mechanism name. Never driven by the client.
    Unknown(String),
}

impl SaslMechanism {
    /// Parse a mechanism name string.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "PLAIN" => Self::Plain,
            "EXTERNAL" => Self::External,
            _ => Self::Unknown(name.to_owned()),
        }
    }

    /// Returns the canonical name of this mechanism.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plain => "PLAIN",
            Self::External => "EXTERNAL",
            Self::Unknown(s) => s,
        }
    }

    /// Check if the client can authenticate with this mechanism.
    pub fn is_supported(&self) -> bool {
        matches!(self, Self::Plain | Self::External)
    }
}

impl std::fmt::Display for SaslMechanism {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw PLAIN token: `authzid NUL authcid NUL password` as UTF-8 bytes.
pub fn plain_token(authzid: &str, authcid: &str, password: &str) -> Vec<u8> {
    let mut token = Vec::with_capacity(authzid.len() + authcid.len() + password.len() + 2);
    token.extend_from_slice(authzid.as_bytes());
    token.push(0);
    token.extend_from_slice(authcid.as_bytes());
    token.push(0);
    token.extend_from_slice(password.as_bytes());
    token
}

/// Base64-encode a token and split it into `AUTHENTICATE` lines.
///
/// Each line carries at most [`SASL_CHUNK_SIZE`] encoded characters. The
/// last line is terminated inline with ` +`; an empty token is sent as a
/// bare `AUTHENTICATE +`.
pub fn authenticate_lines(token: &[u8]) -> Vec<String> {
    let encoded = BASE64.encode(token);
    let chunks = chunk_response(&encoded);
    let Some((last, rest)) = chunks.split_last() else {
        return vec![external_response()];
    };

    let mut lines: Vec<String> = rest
        .iter()
        .map(|chunk| format!("AUTHENTICATE {chunk}"))
        .collect();
    lines.push(format!("AUTHENTICATE {last} +"));
    lines
}

/// The single response line for SASL EXTERNAL.
pub fn external_response() -> String {
    "AUTHENTICATE +".to_owned()
}

/// Split an encoded SASL response into chunks of at most [`SASL_CHUNK_SIZE`].
pub fn chunk_response(encoded: &str) -> Vec<&str> {
    // base64 output is ASCII, so byte offsets are char boundaries.
    let mut chunks = Vec::with_capacity(encoded.len() / SASL_CHUNK_SIZE + 1);
    let mut rest = encoded;
    while !rest.is_empty() {
        let (head, tail) = rest.split_at(rest.len().min(SASL_CHUNK_SIZE));
        chunks.push(head);
        rest = tail;
    }
    chunks
}

/// Decode a base64-encoded SASL challenge.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    if encoded == "+" {
        return Ok(Vec::new());
    }
    BASE64.decode(encoded)
}
