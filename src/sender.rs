//! Outbound line gating and the writer task.
//!
//! Until the handshake completes only registration-critical commands reach
//! the wire; everything else waits in a FIFO queue. Opening the gate flushes
//! the queue in submission order before any later line can pass.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use futures_util::SinkExt;
use tokio::io::AsyncWrite;
use tokio::sync::mpsc;
use tokio_util::codec::FramedWrite;
use tracing::{debug, trace};

use crate::codec::{normalize, LineCodec};
use crate::error::ClientError;

/// Commands that bypass the gate.
pub const CRITICAL_COMMANDS: &[&str] = &["NICK", "USER", "PASS", "PONG", "CAP", "AUTHENTICATE"];

/// Whether `line` starts with a registration-critical command.
///
/// Only the first token counts, compared case-insensitively.
pub fn is_critical(line: &str) -> bool {
    let command = line.split(' ').next().unwrap_or("");
    CRITICAL_COMMANDS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(command))
}

#[derive(Debug, Default)]
struct Gate {
    open: bool,
    queue: VecDeque<String>,
}

/// Cloneable handle for submitting outbound lines.
#[derive(Debug, Clone)]
pub struct Sender {
    gate: Arc<Mutex<Gate>>,
    tx: mpsc::UnboundedSender<String>,
}

impl Sender {
    /// Create a closed sender and the receiving end for the writer task.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sender = Self {
            gate: Arc::new(Mutex::new(Gate::default())),
            tx,
        };
        (sender, rx)
    }

    /// Submit one line. Terminators are stripped.
    ///
    /// Critical commands and every line after the gate opens go straight to
    /// the writer; others are queued.
    pub fn send(&self, line: &str) -> Result<(), ClientError> {
        let line = normalize(line);
        if line.is_empty() {
            return Ok(());
        }
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.open || is_critical(line) {
            self.tx.send(line.to_owned()).map_err(|_| ClientError::SendFailed)
        } else {
            trace!(line, "queued until registration completes");
            gate.queue.push_back(line.to_owned());
            Ok(())
        }
    }

    /// Open the gate and flush the queue.
    ///
    /// Returns true only for the call that actually opened it.
    pub fn open_gate(&self) -> bool {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.open {
            return false;
        }
        gate.open = true;
        let queued = gate.queue.len();
        for line in gate.queue.drain(..) {
            if self.tx.send(line).is_err() {
                debug!("writer gone while flushing queued lines");
                break;
            }
        }
        debug!(queued, "send gate opened");
        true
    }

    pub fn is_open(&self) -> bool {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner).open
    }

    /// Number of lines waiting for the gate.
    pub fn queued(&self) -> usize {
        self.gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .queue
            .len()
    }
}

/// Drain `rx` onto `writer`, one CRLF-terminated line at a time.
///
/// Returns when every [`Sender`] is dropped or a write fails.
pub async fn write_loop<W>(writer: W, mut rx: mpsc::UnboundedReceiver<String>) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin,
{
    let mut framed = FramedWrite::new(writer, LineCodec::new());
    while let Some(line) = rx.recv().await {
        trace!(line = %line, ">>");
        framed.send(line).await?;
    }
    Ok(())
}
