//! Shared session state and the waits the handshake blocks on.
//!
//! The receive flow writes capability and SASL progress here; the
//! registration flow suspends on a `watch` channel until the condition it
//! needs holds. Nothing polls.

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;

use crate::caps::CapabilitySet;
use crate::error::ClientError;

/// Handshake phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Phase {
    /// Opening the transport.
    #[default]
    Connecting,
    /// Sending PASS/NICK/USER and CAP LS.
    Registering,
    /// Waiting for the capability listing and the SASL ACK.
    NegotiatingCapabilities,
    /// Exchanging AUTHENTICATE lines.
    Authenticating,
    /// CAP END sent; normal traffic flows.
    Ready,
}

/// Snapshot of everything the two flows share.
#[derive(Clone, Debug, Default)]
pub struct SessionState {
    pub phase: Phase,
    pub caps: CapabilitySet,
    /// The server sent `AUTHENTICATE +`.
    pub sasl_continue: bool,
    /// The receive flow has ended.
    pub closed: bool,
}

/// Per-connection shared state.
#[derive(Debug)]
pub struct Session {
    nick: String,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// New session for the local identity `nick`.
    pub fn new(nick: impl Into<String>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            nick: nick.into(),
            state,
        }
    }

    /// The local identity.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn phase(&self) -> Phase {
        self.state.borrow().phase
    }

    /// Read the state without copying it.
    pub fn read<T>(&self, f: impl FnOnce(&SessionState) -> T) -> T {
        f(&self.state.borrow())
    }

    /// Mutate the state and wake waiters.
    pub fn update(&self, f: impl FnOnce(&mut SessionState)) {
        self.state.send_modify(f);
    }

    pub fn set_phase(&self, phase: Phase) {
        let changed = self.state.send_if_modified(|state| {
            let changed = state.phase != phase;
            state.phase = phase;
            changed
        });
        if changed {
            info!(?phase, nick = %self.nick, "session phase changed");
        }
    }

    /// Mark the receive flow as finished and release all waiters.
    pub fn close(&self) {
        self.state.send_modify(|state| state.closed = true);
    }

    /// Suspend until `ready` holds.
    ///
    /// Fails with [`ClientError::ConnectionClosed`] if the receive flow ends
    /// first, or [`ClientError::Timeout`] if `limit` elapses.
    pub async fn wait_until<F>(
        &self,
        what: &'static str,
        limit: Option<Duration>,
        ready: F,
    ) -> Result<(), ClientError>
    where
        F: Fn(&SessionState) -> bool,
    {
        let mut rx = self.state.subscribe();
        let wait = async move {
            let satisfied = rx
                .wait_for(|s| s.closed || ready(s))
                .await
                .map(|state| ready(&state))
                .map_err(|_| ClientError::ConnectionClosed)?;
            if satisfied {
                Ok(())
            } else {
                Err(ClientError::ConnectionClosed)
            }
        };
        match limit {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| ClientError::Timeout(what))?,
            None => wait.await,
        }
    }
}
