//! Construction-time client configuration.

use std::path::PathBuf;
use std::time::Duration;

use crate::caps::NegotiationVersion;
use crate::error::ConfigError;
use crate::sasl::SaslMechanism;

/// SASL settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SaslConfig {
    /// Mechanism to authenticate with.
    pub mechanism: SaslMechanism,
    /// Account to authenticate as. Defaults to the username.
    pub account: Option<String>,
}

impl SaslConfig {
    /// SASL PLAIN using the configured username and password.
    pub fn plain() -> Self {
        Self {
            mechanism: SaslMechanism::Plain,
            account: None,
        }
    }

    /// SASL EXTERNAL using the TLS client certificate.
    pub fn external() -> Self {
        Self {
            mechanism: SaslMechanism::External,
            account: None,
        }
    }
}

/// Everything needed to connect and register.
#[derive(Clone, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// Server hostname.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Nickname to register with.
    pub nick: String,
    /// Username (ident).
    pub username: String,
    /// Real name / GECOS.
    pub realname: String,
    /// Server password, or the SASL PLAIN password when SASL is on.
    pub password: Option<String>,
    /// Wrap the connection in TLS.
    pub tls: bool,
    /// Accept any server certificate.
    pub tls_insecure: bool,
    /// SASL settings; `None` disables SASL.
    pub sasl: Option<SaslConfig>,
    /// PEM file holding the client certificate chain and private key.
    pub identity_path: Option<PathBuf>,
    /// Limit on TCP connect plus TLS handshake.
    pub connect_timeout: Duration,
    /// Limit on each negotiation wait. `None` waits forever.
    pub negotiate_timeout: Option<Duration>,
    /// Version announced in `CAP LS`.
    pub cap_version: NegotiationVersion,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 6667,
            nick: "slirc".to_string(),
            username: "slirc".to_string(),
            realname: "slirc client".to_string(),
            password: None,
            tls: false,
            tls_insecure: false,
            sasl: None,
            identity_path: None,
            connect_timeout: Duration::from_secs(30),
            negotiate_timeout: Some(Duration::from_secs(60)),
            cap_version: NegotiationVersion::V302,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for `nick` on `host:port`.
    ///
    /// Username and realname default to the nickname.
    pub fn new(host: impl Into<String>, port: u16, nick: impl Into<String>) -> Self {
        let nick = nick.into();
        Self {
            host: host.into(),
            port,
            username: nick.clone(),
            realname: nick.clone(),
            nick,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = username.into();
        self
    }

    #[must_use]
    pub fn with_realname(mut self, realname: impl Into<String>) -> Self {
        self.realname = realname.into();
        self
    }

    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    #[must_use]
    pub fn with_tls(mut self, tls: bool) -> Self {
        self.tls = tls;
        self
    }

    #[must_use]
    pub fn with_sasl(mut self, sasl: SaslConfig) -> Self {
        self.sasl = Some(sasl);
        self
    }

    #[must_use]
    pub fn with_identity(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_negotiate_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.negotiate_timeout = timeout;
        self
    }

    /// Password with surrounding whitespace removed, if non-empty.
    pub fn effective_password(&self) -> Option<&str> {
        self.password
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }

    /// Account name used for SASL.
    pub fn sasl_account(&self) -> &str {
        self.sasl
            .as_ref()
            .and_then(|s| s.account.as_deref())
            .unwrap_or(&self.username)
    }

    /// Check the configuration before any I/O.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyField("host"));
        }
        if self.nick.is_empty() {
            return Err(ConfigError::EmptyField("nick"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::EmptyField("username"));
        }

        let Some(sasl) = &self.sasl else {
            return Ok(());
        };
        match &sasl.mechanism {
            SaslMechanism::Plain => {
                if self.effective_password().is_none() {
                    return Err(ConfigError::MissingCredential("password"));
                }
            }
            SaslMechanism::External => {
                if !self.tls {
                    return Err(ConfigError::ExternalRequiresTls);
                }
                if self.identity_path.is_none() {
                    return Err(ConfigError::MissingCredential("TLS identity"));
                }
            }
            SaslMechanism::Unknown(name) => {
                return Err(ConfigError::UnsupportedMechanism(name.clone()));
            }
        }
        Ok(())
    }
}
