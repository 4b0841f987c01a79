//! The client: one connection, its receive flow and its handshake.

use std::sync::{Arc, PoisonError, RwLock};

use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use crate::cache::{CacheUpdater, EntityCache};
use crate::caps::CapabilitySet;
use crate::codec::{LineCodec, READ_CHUNK};
use crate::config::ClientConfig;
use crate::dispatch::Dispatcher;
use crate::error::ClientError;
use crate::event::EventBus;
use crate::negotiate::{self, Registration};
use crate::numeric::{NumericRegistry, NumericReply};
use crate::sender::{self, Sender};
use crate::session::{Phase, Session};
use crate::transport;

/// `RPL_TOPIC`.
const RPL_TOPIC: u16 = 332;

struct Connection {
    reader: Option<JoinHandle<Result<(), ClientError>>>,
    writer: JoinHandle<Result<(), ClientError>>,
}

impl Connection {
    fn abort(&self) {
        if let Some(reader) = &self.reader {
            reader.abort();
        }
        self.writer.abort();
    }
}

/// An IRC client.
///
/// The event bus, entity cache and numeric handlers live as long as the
/// client; session state and the send gate are fresh for every connection.
/// Lines sent while disconnected wait for the next connection.
///
/// # Example
///
/// ```no_run
/// use slirc_client::{Client, ClientConfig, Event, EventKind};
///
/// # async fn run() -> Result<(), slirc_client::ClientError> {
/// let mut client = Client::new(ClientConfig::new("irc.libera.chat", 6697, "slirc").with_tls(true))?;
/// client.events().subscribe(EventKind::Message, |event| {
///     if let Event::Message(msg) = event {
///         println!("{}: {}", msg.target, msg.text);
///     }
/// });
/// client.connect().await?;
/// client.send("JOIN #rust")?;
/// client.closed().await
/// # }
/// ```
pub struct Client {
    config: ClientConfig,
    events: Arc<EventBus>,
    cache: Arc<EntityCache>,
    numerics: Arc<RwLock<NumericRegistry>>,
    session: Arc<Session>,
    sender: Sender,
    /// Writer end of `sender`, until a connection takes it.
    outbound: Option<mpsc::UnboundedReceiver<String>>,
    connection: Option<Connection>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("nick", &self.config.nick)
            .field("phase", &self.session.phase())
            .field("connected", &self.connection.is_some())
            .finish()
    }
}

impl Client {
    /// Create a client. The configuration is validated here, before any I/O.
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;

        let events = Arc::new(EventBus::new());
        let cache = Arc::new(EntityCache::new());
        CacheUpdater::new(Arc::clone(&cache)).attach(&events);

        let mut numerics = NumericRegistry::with_defaults();
        let topics = Arc::clone(&cache);
        numerics.register(RPL_TOPIC, move |reply: &NumericReply<'_>| {
            let channel = reply.params.remainder;
            if !topics.set_topic(channel, reply.params.text()) {
                debug!(channel, "topic for uncached channel");
            }
        });

        let (sender, outbound) = Sender::new();
        Ok(Self {
            session: Arc::new(Session::new(config.nick.clone())),
            sender,
            outbound: Some(outbound),
            config,
            events,
            cache,
            numerics: Arc::new(RwLock::new(numerics)),
            connection: None,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The event bus. Subscriptions survive reconnects.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Current handshake phase.
    pub fn phase(&self) -> Phase {
        self.session.phase()
    }

    /// Capabilities seen on the current connection.
    pub fn capabilities(&self) -> CapabilitySet {
        self.session.read(|s| s.caps.clone())
    }

    /// Whether ordinary traffic is flowing.
    pub fn is_gate_open(&self) -> bool {
        self.connection.is_some() && self.sender.is_open()
    }

    /// Install a handler for numeric `code`, replacing any previous one.
    ///
    /// Returns false for codes outside every category (1xx, 8xx).
    pub fn register_numeric<F>(&self, code: u16, handler: F) -> bool
    where
        F: Fn(&NumericReply<'_>) + Send + Sync + 'static,
    {
        self.numerics
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(code, handler)
    }

    /// Connect to the configured server and register.
    pub async fn connect(&mut self) -> Result<Registration, ClientError> {
        let stream = transport::connect(&self.config).await?;
        self.connect_with_stream(stream).await
    }

    /// Register over an already-open stream.
    ///
    /// Any previous connection is torn down first.
    pub async fn connect_with_stream<S>(&mut self, stream: S) -> Result<Registration, ClientError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        self.disconnect();
        self.cache.clear();
        let session = Arc::new(Session::new(self.config.nick.clone()));
        self.session = Arc::clone(&session);
        session.set_phase(Phase::Connecting);

        let rx = match self.outbound.take() {
            Some(rx) => rx,
            None => self.reset_sender(),
        };
        let sender = self.sender.clone();

        let (read, write) = tokio::io::split(stream);
        let writer = tokio::spawn(sender::write_loop(write, rx));

        let dispatcher = Dispatcher::new(
            Arc::clone(&session),
            sender.clone(),
            Arc::clone(&self.events),
            Arc::clone(&self.cache),
            Arc::clone(&self.numerics),
        );
        let reader = tokio::spawn(receive_loop(read, dispatcher, Arc::clone(&session)));

        self.connection = Some(Connection {
            reader: Some(reader),
            writer,
        });

        negotiate::register(&self.config, &session, &sender).await
    }

    /// Send one line. Before registration completes, non-critical lines are
    /// queued and flushed in order once the gate opens. Lines sent before
    /// [`connect`](Self::connect) wait for it.
    pub fn send(&self, line: &str) -> Result<(), ClientError> {
        self.sender.send(line)
    }

    /// Wait for the receive flow to end and return why it ended.
    pub async fn closed(&mut self) -> Result<(), ClientError> {
        let reader = self
            .connection
            .as_mut()
            .and_then(|c| c.reader.take())
            .ok_or(ClientError::NotConnected)?;
        match reader.await {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "receive task failed");
                Err(ClientError::ConnectionClosed)
            }
        }
    }

    /// Drop the current connection, if any.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.abort();
            self.session.close();
            self.outbound = Some(self.reset_sender());
            info!(host = %self.config.host, "disconnected");
        }
    }

    /// Replace the sender with a closed one and park its writer end.
    fn reset_sender(&mut self) -> mpsc::UnboundedReceiver<String> {
        let (sender, rx) = Sender::new();
        self.sender = sender;
        rx
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(connection) = &self.connection {
            connection.abort();
        }
    }
}

async fn receive_loop<R>(read: R, dispatcher: Dispatcher, session: Arc<Session>) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = FramedRead::with_capacity(read, LineCodec::new(), READ_CHUNK);
    let result = loop {
        match lines.next().await {
            Some(Ok(line)) => dispatcher.dispatch(&line),
            Some(Err(e)) => break Err(e),
            None => break Err(ClientError::ConnectionClosed),
        }
    };
    match &result {
        Err(ClientError::ConnectionClosed) => info!("server closed the connection"),
        Err(e) => warn!(error = %e, "receive flow ended"),
        Ok(()) => {}
    }
    session.close();
    result
}
