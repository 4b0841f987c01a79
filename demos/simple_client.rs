//! Simple IRC client example
//!
//! Connects, registers, joins a channel and prints what it sees until the
//! server closes the connection.
//!
//! ```text
//! cargo run --example simple_client -- irc.libera.chat 6697 slirc_demo "#slirc"
//! ```

use slirc_client::{Client, ClientConfig, Event, EventKind, Registration};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| "irc.libera.chat".to_string());
    let port: u16 = args.next().map(|p| p.parse()).transpose()?.unwrap_or(6697);
    let nick = args.next().unwrap_or_else(|| "slirc_demo".to_string());
    let channel = args.next().unwrap_or_else(|| "#slirc".to_string());

    let config = ClientConfig::new(host, port, nick).with_tls(port == 6697);
    let mut client = Client::new(config)?;

    client.events().subscribe(EventKind::Message, |event| {
        if let Event::Message(msg) = event {
            let from = msg.sender.as_ref().map_or("?", |h| h.nick.as_str());
            println!("<{from}> {}: {}", msg.target, msg.text);
        }
    });
    client.events().subscribe(EventKind::Notice, |event| {
        if let Event::Notice(notice) = event {
            println!("-{}- {}", notice.target, notice.text);
        }
    });
    client.events().subscribe(EventKind::Join, |event| {
        if let Event::Join(join) = event {
            println!("→ {} joined {}", join.hostmask.nick, join.channel);
        }
    });

    match client.connect().await? {
        Registration::Ready => println!("✓ Registration successful!"),
        other => println!("registration stopped: {other:?}"),
    }

    client.send(&format!("JOIN {channel}"))?;
    client.send(&format!("PRIVMSG {channel} :Hello from slirc-client"))?;

    if let Err(e) = client.closed().await {
        println!("connection ended: {e}");
    }
    Ok(())
}
