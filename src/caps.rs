//! IRCv3 capability negotiation state.
//!
//! The client tracks every capability it has heard of together with where it
//! stands in negotiation. `CAP LS` replies may span several lines; a line whose
//! subcommand is followed by `*` is a continuation and more are coming.
//!
//! # Reference
//! - IRCv3 Capability Negotiation: <https://ircv3.net/specs/extensions/capability-negotiation>

use std::collections::BTreeMap;

/// The SASL capability name.
pub const SASL: &str = "sasl";

/// CAP negotiation version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NegotiationVersion {
    /// CAP 3.1
    V301,
    /// CAP 3.2
    #[default]
    V302,
}

impl NegotiationVersion {
    /// Get the numeric version value.
    pub fn version(&self) -> u32 {
        match self {
            Self::V301 => 301,
            Self::V302 => 302,
        }
    }

    /// The `CAP LS` line announcing this version.
    pub fn ls_line(&self) -> String {
        format!("CAP LS {}", self.version())
    }
}

/// Where a capability stands in negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CapState {
    /// Listed by the server in `CAP LS`.
    Offered,
    /// Requested with `CAP REQ`, no answer yet.
    Requested,
    /// Acknowledged by the server.
    Acknowledged,
    /// Refused by the server.
    Rejected,
}

/// One capability and its negotiation state.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Capability {
    /// Capability name, without any `=value` suffix.
    pub name: String,
    /// Value advertised in CAP 3.2 (`sasl=PLAIN,EXTERNAL`).
    pub value: Option<String>,
    /// Negotiation state.
    pub state: CapState,
    /// Whether the server listed it.
    pub offered: bool,
}

/// Split a capability token into name and optional value.
pub fn split_token(token: &str) -> (&str, Option<&str>) {
    match token.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (token, None),
    }
}

/// All capabilities seen during a session.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    caps: BTreeMap<String, Capability>,
    ls_complete: bool,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `CAP LS` line. Returns true when the listing is complete.
    pub fn offer(&mut self, list: &str, more_follows: bool) -> bool {
        for token in list.split_whitespace() {
            let (name, value) = split_token(token);
            let cap = self.caps.entry(name.to_owned()).or_insert_with(|| Capability {
                name: name.to_owned(),
                value: None,
                state: CapState::Offered,
                offered: true,
            });
            cap.offered = true;
            cap.value = value.map(str::to_owned);
        }
        if !more_follows {
            self.ls_complete = true;
        }
        !more_follows
    }

    /// Mark a capability as requested.
    pub fn request(&mut self, name: &str) {
        self.set_state(name, CapState::Requested);
    }

    /// Record a `CAP ACK` list. Names prefixed with `-` were disabled.
    pub fn acknowledge(&mut self, list: &str) {
        for token in list.split_whitespace() {
            if let Some(name) = token.strip_prefix('-') {
                self.set_state(name, CapState::Offered);
            } else {
                self.set_state(split_token(token).0, CapState::Acknowledged);
            }
        }
    }

    /// Record a `CAP NAK` list.
    pub fn reject(&mut self, list: &str) {
        for token in list.split_whitespace() {
            self.set_state(split_token(token).0, CapState::Rejected);
        }
    }

    fn set_state(&mut self, name: &str, state: CapState) {
        self.caps
            .entry(name.to_owned())
            .and_modify(|cap| cap.state = state)
            .or_insert_with(|| Capability {
                name: name.to_owned(),
                value: None,
                state,
                offered: false,
            });
    }

    /// Whether a complete `CAP LS` listing has arrived.
    pub fn listing_complete(&self) -> bool {
        self.ls_complete
    }

    /// Whether the server listed `name`.
    pub fn supports(&self, name: &str) -> bool {
        self.caps.get(name).is_some_and(|c| c.offered)
    }

    /// Whether the server acknowledged `name`.
    pub fn is_acknowledged(&self, name: &str) -> bool {
        self.caps
            .get(name)
            .is_some_and(|c| c.state == CapState::Acknowledged)
    }

    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.caps.get(name)
    }

    /// Names of all listed capabilities, in name order.
    pub fn supported(&self) -> impl Iterator<Item = &str> {
        self.caps.values().filter(|c| c.offered).map(|c| c.name.as_str())
    }

    /// Names of all acknowledged capabilities, in name order.
    pub fn acknowledged(&self) -> impl Iterator<Item = &str> {
        self.caps
            .values()
            .filter(|c| c.state == CapState::Acknowledged)
            .map(|c| c.name.as_str())
    }
}
