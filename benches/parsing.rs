//! Benchmarks for line framing and classification.

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use slirc_client::{LineCodec, ParsedLine};
use tokio_util::codec::Decoder;

/// Simple PING message
const SIMPLE_MESSAGE: &str = "PING :irc.example.com";

/// Message with prefix
const PREFIX_MESSAGE: &str = ":nick!user@host PRIVMSG #channel :Hello, world!";

/// Numeric response
const NUMERIC_RESPONSE: &str = ":irc.server.net 001 nickname :Welcome to the IRC Network nickname!user@host";

/// Capability listing with values
const CAP_LS: &str = ":irc.server.net CAP * LS * :account-notify away-notify batch cap-notify chghost echo-message extended-join invite-notify labeled-response message-tags multi-prefix sasl=PLAIN,EXTERNAL server-time setname userhost-in-names";

/// Mode change with arguments
const MODE_CHANGE: &str = ":op!op@services.example.net MODE #long-channel-name +ov-b nick1 nick2 *!*@bad.host";

fn benchmark_parsing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Line Parsing");

    for (name, line) in [
        ("simple_ping", SIMPLE_MESSAGE),
        ("with_prefix", PREFIX_MESSAGE),
        ("numeric_response", NUMERIC_RESPONSE),
        ("cap_ls", CAP_LS),
        ("mode_change", MODE_CHANGE),
    ] {
        group.bench_function(name, |b| {
            b.iter(|| {
                let parsed = ParsedLine::parse(black_box(line)).unwrap();
                black_box(parsed);
            })
        });
    }

    group.finish();
}

fn benchmark_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("Line Framing");

    for count in [1usize, 16, 256] {
        let mut stream = String::new();
        for _ in 0..count {
            stream.push_str(PREFIX_MESSAGE);
            stream.push_str("\r\n");
        }
        group.throughput(Throughput::Bytes(stream.len() as u64));

        group.bench_with_input(BenchmarkId::new("decode", count), &stream, |b, stream| {
            b.iter(|| {
                let mut codec = LineCodec::new();
                let mut buf = BytesMut::from(stream.as_bytes());
                let mut lines = 0;
                while let Some(line) = codec.decode(&mut buf).unwrap() {
                    black_box(line);
                    lines += 1;
                }
                assert_eq!(lines, count);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_parsing, benchmark_framing);
criterion_main!(benches);
