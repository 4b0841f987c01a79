//! End-to-end registration against a scripted server over an in-memory pipe.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use slirc_client::{
    Client, ClientConfig, ClientError, Event, EventKind, LineCodec, Phase, Registration,
    SaslConfig,
};
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::time::timeout;
use tokio_util::codec::Framed;

const STEP: Duration = Duration::from_secs(5);

struct FakeServer {
    io: Framed<DuplexStream, LineCodec>,
}

impl FakeServer {
    async fn expect(&mut self, line: &str) {
        let got = timeout(STEP, self.io.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {line:?}"))
            .expect("client hung up")
            .unwrap();
        assert_eq!(got, line);
    }

    async fn expect_silence(&mut self) {
        let next = timeout(Duration::from_millis(100), self.io.next()).await;
        assert!(next.is_err(), "unexpected line: {next:?}");
    }

    async fn send(&mut self, line: &str) {
        self.io.send(line).await.unwrap();
    }

    async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.io.get_mut();
        stream.write_all(bytes).await.unwrap();
        stream.flush().await.unwrap();
    }

    async fn registration(&mut self, nick: &str) {
        self.expect(&format!("NICK {nick}")).await;
        self.expect(&format!("USER {nick} 0 * :{nick}")).await;
        self.expect("CAP LS 302").await;
    }
}

fn pipe() -> (DuplexStream, FakeServer) {
    let (client, server) = tokio::io::duplex(16 * 1024);
    (
        client,
        FakeServer {
            io: Framed::new(server, LineCodec::new()),
        },
    )
}

#[tokio::test]
async fn plain_registration_reaches_ready() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send(":irc.test CAP * LS :multi-prefix server-time").await;
        server.expect("CAP END").await;
        server
    };
    let (registration, mut server) = tokio::join!(client.connect_with_stream(stream), script);

    assert_eq!(registration.unwrap(), Registration::Ready);
    assert_eq!(client.phase(), Phase::Ready);
    assert!(client.is_gate_open());
    assert!(client.capabilities().supports("server-time"));

    client.send("PRIVMSG #rust :hi\r\n").unwrap();
    server.expect("PRIVMSG #rust :hi").await;
}

#[tokio::test]
async fn lines_sent_before_connect_follow_registration() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    client.send("JOIN #rust").unwrap();
    client.send("PRIVMSG #rust :early").unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send(":irc.test CAP * LS :multi-prefix").await;
        server.expect("CAP END").await;
        server.expect("JOIN #rust").await;
        server.expect("PRIVMSG #rust :early").await;
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);
    assert_eq!(registration.unwrap(), Registration::Ready);
}

#[tokio::test]
async fn server_password_is_sent_without_sasl() {
    let config = ClientConfig::new("irc.test", 6667, "me").with_password(" secret ");
    let mut client = Client::new(config).unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.expect("PASS secret").await;
        server.registration("me").await;
        server.send(":irc.test CAP * LS :").await;
        server.expect("CAP END").await;
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);
    assert_eq!(registration.unwrap(), Registration::Ready);
}

#[tokio::test]
async fn sasl_plain_exchange() {
    let config = ClientConfig::new("irc.test", 6667, "me")
        .with_password("pw")
        .with_sasl(SaslConfig::plain());
    let mut client = Client::new(config).unwrap();
    let (_id, mut acks) = client.events().subscribe_channel(EventKind::CapAck);
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send(":irc.test CAP * LS * :multi-prefix").await;
        server.send(":irc.test CAP * LS :sasl=PLAIN,EXTERNAL").await;
        server.expect("CAP REQ :sasl").await;
        server.send(":irc.test CAP me ACK :sasl").await;
        server.expect("AUTHENTICATE PLAIN").await;
        server.send("AUTHENTICATE +").await;
        server.expect("AUTHENTICATE bWUAbWUAcHc= +").await;
        server.send(":irc.test 900 me me!me@host me :You are now logged in as me").await;
        server.send(":irc.test 903 me :SASL authentication successful").await;
        server.expect("CAP END").await;
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);

    assert_eq!(registration.unwrap(), Registration::Ready);
    assert_eq!(acks.recv().await, Some(Event::CapAck("sasl".into())));
}

#[tokio::test]
async fn sasl_not_offered_leaves_registration_open() {
    let config = ClientConfig::new("irc.test", 6667, "me")
        .with_password("pw")
        .with_sasl(SaslConfig::plain());
    let mut client = Client::new(config).unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send(":irc.test CAP * LS :multi-prefix").await;
        server
    };
    let (registration, mut server) = tokio::join!(client.connect_with_stream(stream), script);

    assert_eq!(registration.unwrap(), Registration::SaslUnavailable);
    assert!(!client.is_gate_open());

    client.send("JOIN #rust").unwrap();
    server.expect_silence().await;

    // The caller can still finish the handshake by hand.
    client.send("CAP END").unwrap();
    server.expect("CAP END").await;
}

#[tokio::test]
async fn ping_is_answered_during_registration() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send("PING :irc.test").await;
        server.expect("PONG :irc.test").await;
        server.send(":irc.test CAP * LS :multi-prefix").await;
        server.expect("CAP END").await;
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);
    assert_eq!(registration.unwrap(), Registration::Ready);
}

#[tokio::test]
async fn lines_split_across_writes_are_reassembled() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    let (_id, mut ls) = client.events().subscribe_channel(EventKind::CapLs);
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send_raw(b":irc.test CAP * LS :multi-pre").await;
        tokio::task::yield_now().await;
        server.send_raw(b"fix sasl\r").await;
        tokio::task::yield_now().await;
        server.send_raw(b"\n").await;
        server.expect("CAP END").await;
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);

    assert_eq!(registration.unwrap(), Registration::Ready);
    assert_eq!(ls.recv().await, Some(Event::CapLs("multi-prefix sasl".into())));
}

#[tokio::test]
async fn events_and_cache_after_registration() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    let (_id, mut messages) = client.events().subscribe_channel(EventKind::Message);
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send(":irc.test CAP * LS :multi-prefix").await;
        server.expect("CAP END").await;
        server
    };
    let (registration, mut server) = tokio::join!(client.connect_with_stream(stream), script);
    assert_eq!(registration.unwrap(), Registration::Ready);

    server.send(":me!u@h JOIN :#rust").await;
    server.send(":irc.test 332 me #rust :Rust discussion").await;
    server.send(":bob!b@example.net JOIN #rust").await;
    server.send(":bob!b@example.net PRIVMSG #rust :hello there").await;
    server.send("PING :sync").await;
    server.expect("PONG :sync").await;

    let Some(Event::Message(msg)) = messages.recv().await else {
        panic!("expected a message event");
    };
    assert_eq!(msg.sender.unwrap().nick, "bob");
    assert_eq!(msg.target, "#rust");
    assert_eq!(msg.text, "hello there");

    let channel = client.cache().channel("#rust").unwrap();
    assert_eq!(channel.name, "rust");
    assert_eq!(channel.topic, "Rust discussion");
    assert_eq!(channel.member_count(), 1);
    assert!(channel.contains("Bob"));

    server.send(":me!u@h PART #rust").await;
    server.send("PING :sync2").await;
    server.expect("PONG :sync2").await;
    assert!(client.cache().channel("#rust").is_none());
}

#[tokio::test]
async fn hangup_during_negotiation_fails_registration() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        drop(server);
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);

    assert!(matches!(registration, Err(ClientError::ConnectionClosed)));
    assert!(matches!(client.closed().await, Err(ClientError::ConnectionClosed)));
}

#[tokio::test]
async fn closed_reports_server_hangup() {
    let mut client = Client::new(ClientConfig::new("irc.test", 6667, "me")).unwrap();
    let (stream, mut server) = pipe();

    let script = async move {
        server.registration("me").await;
        server.send(":irc.test CAP * LS :").await;
        server.expect("CAP END").await;
        server.send("ERROR :Closing Link").await;
    };
    let (registration, ()) = tokio::join!(client.connect_with_stream(stream), script);
    assert_eq!(registration.unwrap(), Registration::Ready);

    let err = client.closed().await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionClosed));
    assert!(err.is_fatal());
}
