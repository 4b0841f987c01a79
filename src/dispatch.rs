//! Routes each framed line to its effect.
//!
//! Every line is first published raw, then classified by the pure parser.
//! The dispatcher answers keepalives, records capability and SASL progress
//! on the session, runs numeric handlers and raises typed events. Lines that
//! violate the line grammar are logged and dropped.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, trace, warn};

use crate::cache::{is_channel_name, EntityCache};
use crate::casemap::irc_eq;
use crate::event::{Event, EventBus, Membership, Message, ModeChange, ModeTarget};
use crate::hostmask::Hostmask;
use crate::numeric::{NumericCategory, NumericRegistry, NumericReply};
use crate::parse::{Params, ParsedLine};
use crate::sender::Sender;
use crate::session::Session;

/// Interprets inbound lines for one connection.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    session: Arc<Session>,
    sender: Sender,
    events: Arc<EventBus>,
    cache: Arc<EntityCache>,
    numerics: Arc<RwLock<NumericRegistry>>,
}

impl Dispatcher {
    pub fn new(
        session: Arc<Session>,
        sender: Sender,
        events: Arc<EventBus>,
        cache: Arc<EntityCache>,
        numerics: Arc<RwLock<NumericRegistry>>,
    ) -> Self {
        Self {
            session,
            sender,
            events,
            cache,
            numerics,
        }
    }

    /// Handle one line, terminator already stripped.
    pub fn dispatch(&self, line: &str) {
        trace!(line, "<<");
        self.events.publish(Event::RawLine(line.to_owned()));

        let parsed = match ParsedLine::parse(line) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!(error = %e, line, "dropping malformed line");
                return;
            }
        };

        match parsed {
            ParsedLine::Ping { token } => self.on_ping(token),
            ParsedLine::AuthenticateContinue => {
                self.session.update(|s| s.sasl_continue = true);
            }
            ParsedLine::Unclassified => {}
            ParsedLine::Numeric { code, params } => self.on_numeric(code, params),
            ParsedLine::Named { command, params } => self.on_command(command, params, line),
        }
    }

    fn on_ping(&self, token: &str) {
        if let Err(e) = self.sender.send(&format!("PONG :{token}")) {
            warn!(error = %e, "failed to answer PING");
        }
        // A server that pings us has accepted the connection.
        self.sender.open_gate();
    }

    fn on_numeric(&self, code: u16, params: Params<'_>) {
        let Some(category) = NumericCategory::of(code) else {
            return;
        };
        let handler = self
            .numerics
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(category, code);
        match handler {
            Some(handler) => handler(&NumericReply {
                code,
                category,
                params,
            }),
            None => trace!(code, "no handler for numeric"),
        }
    }

    fn on_command(&self, command: &str, params: Params<'_>, raw: &str) {
        match command.to_ascii_uppercase().as_str() {
            "PRIVMSG" => self.events.publish(Event::Message(message(params, raw))),
            "NOTICE" => self.events.publish(Event::Notice(message(params, raw))),
            "MODE" => self.on_mode(params),
            "JOIN" => self.events.publish(Event::Join(self.membership(params))),
            "PART" => self.events.publish(Event::Part(self.membership(params))),
            "CAP" => self.on_cap(params),
            _ => {}
        }
    }

    fn on_mode(&self, params: Params<'_>) {
        let target = if is_channel_name(params.target) {
            self.cache.channel(params.target).map(ModeTarget::Channel)
        } else {
            self.cache.user(params.target).map(ModeTarget::User)
        }
        .unwrap_or_else(|| ModeTarget::Unresolved(params.target.to_owned()));

        self.events.publish(Event::ModeChange(ModeChange {
            sender: Hostmask::parse(params.actor),
            target,
            modes: params.text().to_owned(),
        }));
    }

    fn membership(&self, params: Params<'_>) -> Membership {
        let hostmask = Hostmask::parse(params.actor);
        let channel = if params.target.is_empty() {
            params.text()
        } else {
            params.target
        };
        Membership {
            is_self: irc_eq(&hostmask.nick, self.session.nick()),
            channel: channel.to_owned(),
            hostmask,
        }
    }

    fn on_cap(&self, params: Params<'_>) {
        let list = params.text();
        match params.subcommand().to_ascii_uppercase().as_str() {
            "LS" => {
                let more = params.sub_argument() == Some("*");
                let mut complete = None;
                self.session.update(|s| {
                    if s.caps.offer(list, more) {
                        complete = Some(s.caps.supported().collect::<Vec<_>>().join(" "));
                    }
                });
                if let Some(supported) = complete {
                    debug!(caps = %supported, "capability listing complete");
                    self.events.publish(Event::CapLs(supported));
                }
            }
            "ACK" => {
                self.session.update(|s| s.caps.acknowledge(list));
                debug!(caps = list, "capabilities acknowledged");
                self.events.publish(Event::CapAck(list.to_owned()));
            }
            "NAK" => {
                self.session.update(|s| s.caps.reject(list));
                debug!(caps = list, "capabilities rejected");
                self.events.publish(Event::CapNak(list.to_owned()));
            }
            other => trace!(subcommand = other, "ignoring CAP subcommand"),
        }
    }
}

fn message(params: Params<'_>, raw: &str) -> Message {
    Message {
        sender: (!params.actor.is_empty()).then(|| Hostmask::parse(params.actor)),
        target: params.target.to_owned(),
        text: params.text().to_owned(),
        raw: raw.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheUpdater, Channel, User};
    use crate::event::EventKind;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    struct Harness {
        dispatcher: Dispatcher,
        session: Arc<Session>,
        sender: Sender,
        events: Arc<EventBus>,
        cache: Arc<EntityCache>,
        numerics: Arc<RwLock<NumericRegistry>>,
        rx: mpsc::UnboundedReceiver<String>,
    }

    impl Harness {
        fn new() -> Self {
            let session = Arc::new(Session::new("me"));
            let (sender, rx) = Sender::new();
            let events = Arc::new(EventBus::new());
            let cache = Arc::new(EntityCache::new());
            let numerics = Arc::new(RwLock::new(NumericRegistry::new()));
            CacheUpdater::new(Arc::clone(&cache)).attach(&events);
            let dispatcher = Dispatcher::new(
                Arc::clone(&session),
                sender.clone(),
                Arc::clone(&events),
                Arc::clone(&cache),
                Arc::clone(&numerics),
            );
            Self {
                dispatcher,
                session,
                sender,
                events,
                cache,
                numerics,
                rx,
            }
        }

        fn sent(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(line) = self.rx.try_recv() {
                out.push(line);
            }
            out
        }

        fn record(&self, kind: EventKind) -> Arc<Mutex<Vec<Event>>> {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&seen);
            self.events.subscribe(kind, move |e| sink.lock().unwrap().push(e.clone()));
            seen
        }
    }

    #[test]
    fn test_ping_answers_and_opens_gate() {
        let mut h = Harness::new();
        h.sender.send("JOIN #queued").unwrap();
        h.dispatcher.dispatch("PING :12345");
        assert_eq!(h.sent(), vec!["PONG :12345", "JOIN #queued"]);
        assert!(h.sender.is_open());
    }

    #[test]
    fn test_raw_line_published_first() {
        let h = Harness::new();
        let raw = h.record(EventKind::RawLine);
        h.dispatcher.dispatch(":lonely");
        h.dispatcher.dispatch(":srv 001 me :Welcome");
        assert_eq!(raw.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_welcome_is_not_a_message() {
        let h = Harness::new();
        let messages = h.record(EventKind::Message);
        h.dispatcher.dispatch(":server 001 mynick :Welcome");
        assert!(messages.lock().unwrap().is_empty());
    }

    #[test]
    fn test_numeric_handler_runs() {
        let h = Harness::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        h.numerics.write().unwrap().register(1, move |reply| {
            sink.lock().unwrap().push(reply.params.text().to_owned());
        });
        h.dispatcher.dispatch(":server 001 mynick :Welcome");
        h.dispatcher.dispatch(":server 150 mynick :ignored");
        assert_eq!(*seen.lock().unwrap(), vec!["Welcome"]);
    }

    #[test]
    fn test_privmsg_event() {
        let h = Harness::new();
        let messages = h.record(EventKind::Message);
        let line = ":nick!user@host PRIVMSG #chan :hello world";
        h.dispatcher.dispatch(line);

        let seen = messages.lock().unwrap();
        let Event::Message(msg) = &seen[0] else {
            panic!("expected message, got {:?}", seen[0]);
        };
        assert_eq!(msg.sender.as_ref().unwrap().nick, "nick");
        assert_eq!(msg.target, "#chan");
        assert_eq!(msg.text, "hello world");
        assert_eq!(msg.raw, line);
    }

    #[test]
    fn test_notice_event() {
        let h = Harness::new();
        let notices = h.record(EventKind::Notice);
        h.dispatcher.dispatch(":irc.test NOTICE * :*** Looking up your hostname");
        let seen = notices.lock().unwrap();
        let Event::Notice(msg) = &seen[0] else {
            panic!("expected notice");
        };
        assert!(msg.sender.as_ref().unwrap().is_server());
        assert_eq!(msg.text, "*** Looking up your hostname");
    }

    #[test]
    fn test_self_join_and_remote_join() {
        let h = Harness::new();
        h.dispatcher.dispatch(":ME!u@h JOIN :#test");
        h.dispatcher.dispatch(":bob!b@h JOIN #test");
        h.dispatcher.dispatch(":bob!b@h JOIN #test");

        let channel = h.cache.channel("#test").unwrap();
        assert_eq!(channel.name, "test");
        assert_eq!(channel.member_count(), 1);

        h.dispatcher.dispatch(":me!u@h PART #test :bye");
        assert!(h.cache.channel("#test").is_none());
    }

    #[test]
    fn test_mode_resolution() {
        let h = Harness::new();
        let modes = h.record(EventKind::ModeChange);
        h.cache.put_channel(Channel::new("#chan", ""));

        h.dispatcher.dispatch(":op!u@h MODE #chan +o other");
        h.dispatcher.dispatch(":op!u@h MODE #gone +m");

        let seen = modes.lock().unwrap();
        let Event::ModeChange(first) = &seen[0] else {
            panic!("expected mode change");
        };
        assert!(matches!(&first.target, ModeTarget::Channel(c) if c.name == "chan"));
        assert_eq!(first.modes, "+o other");
        assert_eq!(first.sender.nick, "op");

        let Event::ModeChange(second) = &seen[1] else {
            panic!("expected mode change");
        };
        assert_eq!(second.target, ModeTarget::Unresolved("#gone".into()));
    }

    #[test]
    fn test_mode_on_cached_user() {
        let h = Harness::new();
        let modes = h.record(EventKind::ModeChange);
        h.cache.put_user(User::new(Hostmask::parse("Bob!b@example.net")));

        h.dispatcher.dispatch(":Bob!b@example.net MODE bob :+i");
        h.dispatcher.dispatch(":srv MODE carol +w");

        let seen = modes.lock().unwrap();
        let Event::ModeChange(first) = &seen[0] else {
            panic!("expected mode change");
        };
        let ModeTarget::User(user) = &first.target else {
            panic!("expected a user target, got {:?}", first.target);
        };
        assert_eq!(user.nick(), "Bob");
        assert_eq!(user.hostmask.host, "example.net");
        assert_eq!(first.modes, "+i");

        let Event::ModeChange(second) = &seen[1] else {
            panic!("expected mode change");
        };
        assert_eq!(second.target, ModeTarget::Unresolved("carol".into()));
    }

    #[test]
    fn test_cap_ls_multiline() {
        let h = Harness::new();
        let ls = h.record(EventKind::CapLs);
        h.dispatcher.dispatch(":irc.test CAP * LS * :multi-prefix");
        assert!(!h.session.read(|s| s.caps.listing_complete()));
        assert!(ls.lock().unwrap().is_empty());

        h.dispatcher.dispatch(":irc.test CAP * LS :sasl=PLAIN");
        assert!(h.session.read(|s| s.caps.supports("sasl")));
        assert_eq!(
            *ls.lock().unwrap(),
            vec![Event::CapLs("multi-prefix sasl".into())]
        );
    }

    #[test]
    fn test_cap_ack_and_nak() {
        let h = Harness::new();
        let acks = h.record(EventKind::CapAck);
        let naks = h.record(EventKind::CapNak);
        h.dispatcher.dispatch(":irc.test CAP me ACK :sasl");
        h.dispatcher.dispatch(":irc.test CAP me NAK :batch");

        assert!(h.session.read(|s| s.caps.is_acknowledged("sasl")));
        assert_eq!(*acks.lock().unwrap(), vec![Event::CapAck("sasl".into())]);
        assert_eq!(*naks.lock().unwrap(), vec![Event::CapNak("batch".into())]);
    }

    #[test]
    fn test_authenticate_continue() {
        let h = Harness::new();
        h.dispatcher.dispatch("AUTHENTICATE +");
        assert!(h.session.read(|s| s.sasl_continue));
    }
}
