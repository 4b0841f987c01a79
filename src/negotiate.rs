//! The registration handshake.
//!
//! Runs once per connection, alongside the receive flow:
//!
//! 1. `PASS` (server password only), `NICK`, `USER`, `CAP LS 302`
//! 2. wait for a complete capability listing; with SASL, `CAP REQ :sasl` and
//!    wait for the answer
//! 3. `AUTHENTICATE <mechanism>`, wait for `AUTHENTICATE +`, send the response
//! 4. `CAP END` and open the send gate
//!
//! Each wait suspends on the session until the receive flow records the
//! signal, the flow ends, or the negotiate timeout elapses.

use tracing::{debug, info, warn};

use crate::caps::{CapState, SASL};
use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError};
use crate::sasl::{authenticate_lines, external_response, plain_token, SaslMechanism};
use crate::sender::Sender;
use crate::session::{Phase, Session};

/// How the handshake ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Registration {
    /// `CAP END` was sent and the gate is open.
    Ready,
    /// SASL was configured but the server does not offer it.
    ///
    /// The handshake stops without `CAP END`; the gate stays closed.
    SaslUnavailable,
    /// The server refused `CAP REQ :sasl`. Left open like [`Registration::SaslUnavailable`].
    SaslRejected,
}

/// The `AUTHENTICATE` lines answering the server's continuation.
///
/// Fails before anything is sent if the mechanism cannot be driven.
pub fn sasl_response(config: &ClientConfig, mechanism: &SaslMechanism) -> Result<Vec<String>, ConfigError> {
    match mechanism {
        SaslMechanism::Plain => {
            let password = config
                .effective_password()
                .ok_or(ConfigError::MissingCredential("password"))?;
            let account = config.sasl_account();
            Ok(authenticate_lines(&plain_token(account, account, password)))
        }
        SaslMechanism::External => Ok(vec![external_response()]),
        SaslMechanism::Unknown(name) => Err(ConfigError::UnsupportedMechanism(name.clone())),
    }
}

/// Drive the handshake to completion.
pub async fn register(
    config: &ClientConfig,
    session: &Session,
    sender: &Sender,
) -> Result<Registration, ClientError> {
    let limit = config.negotiate_timeout;

    session.set_phase(Phase::Registering);
    if config.sasl.is_none() {
        if let Some(password) = config.effective_password() {
            sender.send(&format!("PASS {password}"))?;
        }
    }
    sender.send(&format!("NICK {}", config.nick))?;
    sender.send(&format!("USER {} 0 * :{}", config.username, config.realname))?;
    sender.send(&config.cap_version.ls_line())?;

    session.set_phase(Phase::NegotiatingCapabilities);
    session
        .wait_until("waiting for the capability listing", limit, |s| {
            s.caps.listing_complete()
        })
        .await?;

    if let Some(sasl) = &config.sasl {
        if !session.read(|s| s.caps.supports(SASL)) {
            warn!("server does not offer SASL; registration left open");
            return Ok(Registration::SaslUnavailable);
        }

        session.update(|s| s.caps.request(SASL));
        sender.send(&format!("CAP REQ :{SASL}"))?;
        session
            .wait_until("waiting for the SASL acknowledgement", limit, |s| {
                s.caps.get(SASL).is_some_and(|c| {
                    matches!(c.state, CapState::Acknowledged | CapState::Rejected)
                })
            })
            .await?;
        if !session.read(|s| s.caps.is_acknowledged(SASL)) {
            warn!("server refused the sasl capability; registration left open");
            return Ok(Registration::SaslRejected);
        }

        let response = sasl_response(config, &sasl.mechanism)?;
        session.update(|s| s.sasl_continue = false);
        session.set_phase(Phase::Authenticating);
        sender.send(&format!("AUTHENTICATE {}", sasl.mechanism))?;
        session
            .wait_until("waiting for the SASL continuation", limit, |s| s.sasl_continue)
            .await?;
        debug!(mechanism = %sasl.mechanism, lines = response.len(), "sending SASL response");
        for line in &response {
            sender.send(line)?;
        }
    }

    sender.send("CAP END")?;
    sender.open_gate();
    session.set_phase(Phase::Ready);
    info!(nick = %config.nick, "registration complete");
    Ok(Registration::Ready)
}
