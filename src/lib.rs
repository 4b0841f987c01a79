//! # slirc-client
//!
//! An asynchronous IRC client engine built on Tokio.
//!
//! ## Features
//!
//! - Line framing with carry-over across reads and outbound normalization
//! - Registration with IRCv3 capability negotiation (`CAP LS 302`)
//! - SASL PLAIN and EXTERNAL, with TLS client certificates
//! - A send gate that holds ordinary traffic until registration completes
//! - Typed events on a per-client publish/subscribe bus
//! - A live cache of joined channels and their members
//! - Numeric reply handlers grouped by category

#![deny(clippy::all)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! ## Quick Start
//!
//! ```rust,no_run
//! use slirc_client::{Client, ClientConfig, Event, EventKind, Registration, SaslConfig};
//!
//! # async fn run() -> Result<(), slirc_client::ClientError> {
//! let config = ClientConfig::new("irc.example.net", 6697, "slirc")
//!     .with_tls(true)
//!     .with_password("hunter2")
//!     .with_sasl(SaslConfig::plain());
//!
//! let mut client = Client::new(config)?;
//! client.events().subscribe(EventKind::Notice, |event| {
//!     if let Event::Notice(notice) = event {
//!         println!("-{}- {}", notice.target, notice.text);
//!     }
//! });
//!
//! // Queued until the handshake finishes.
//! client.send("JOIN #rust")?;
//!
//! match client.connect().await? {
//!     Registration::Ready => println!("registered"),
//!     other => println!("registration stopped: {other:?}"),
//! }
//! client.closed().await
//! # }
//! ```
//!
//! ### Parsing lines
//!
//! ```rust
//! use slirc_client::ParsedLine;
//!
//! let line = ParsedLine::parse(":nick!user@host PRIVMSG #chan :hello world").unwrap();
//! let params = line.params().unwrap();
//! assert_eq!(params.target, "#chan");
//! assert_eq!(params.text(), "hello world");
//! ```

pub mod cache;
pub mod caps;
pub mod casemap;
pub mod client;
pub mod codec;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod hostmask;
pub mod negotiate;
pub mod numeric;
pub mod parse;
pub mod sasl;
pub mod sender;
pub mod session;
pub mod transport;

pub use self::cache::{CacheUpdater, Channel, EntityCache, User};
pub use self::caps::{CapState, Capability, CapabilitySet, NegotiationVersion};
pub use self::casemap::{irc_eq, irc_to_lower};
pub use self::client::Client;
pub use self::codec::LineCodec;
pub use self::config::{ClientConfig, SaslConfig};
pub use self::error::{ClientError, ConfigError, LineParseError, Result};
pub use self::event::{Event, EventBus, EventKind, Membership, Message, ModeChange, ModeTarget, SubscriptionId};
pub use self::hostmask::Hostmask;
pub use self::negotiate::Registration;
pub use self::numeric::{NumericCategory, NumericHandler, NumericRegistry, NumericReply};
pub use self::parse::{Params, ParsedLine};
pub use self::sasl::SaslMechanism;
pub use self::sender::Sender;
pub use self::session::{Phase, Session, SessionState};
pub use self::transport::{TlsIdentity, Transport};
