//! Message originator identity (`nick!user@host`).

use std::fmt;

/// The identity of whoever sent a message.
///
/// Parsed from a full `nick!user@host` prefix, or built from a bare actor.
/// A bare actor containing a dot is taken to be a server name and lands in
/// `host`; anything else is a nickname.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Hostmask {
    /// Nickname, empty for server-originated messages.
    pub nick: String,
    /// Username (ident).
    pub user: String,
    /// Hostname, or the server name for server-originated messages.
    pub host: String,
}

impl Hostmask {
    /// Build a hostmask from its parts.
    pub fn new(nick: impl Into<String>, user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            nick: nick.into(),
            user: user.into(),
            host: host.into(),
        }
    }

    /// Parse an actor string.
    pub fn parse(actor: &str) -> Self {
        if let Some((nick, rest)) = actor.split_once('!') {
            let (user, host) = rest.split_once('@').unwrap_or((rest, ""));
            return Self::new(nick, user, host);
        }
        if let Some((nick, host)) = actor.split_once('@') {
            return Self::new(nick, "", host);
        }
        if actor.contains('.') {
            Self::new("", "", actor)
        } else {
            Self::new(actor, "", "")
        }
    }

    /// Whether this identity is a server rather than a user.
    pub fn is_server(&self) -> bool {
        self.nick.is_empty()
    }
}

impl From<&str> for Hostmask {
    fn from(actor: &str) -> Self {
        Self::parse(actor)
    }
}

impl fmt::Display for Hostmask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_server() {
            return f.write_str(&self.host);
        }
        f.write_str(&self.nick)?;
        if !self.user.is_empty() {
            write!(f, "!{}", self.user)?;
        }
        if !self.host.is_empty() {
            write!(f, "@{}", self.host)?;
        }
        Ok(())
    }
}
