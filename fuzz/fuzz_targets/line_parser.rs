//! Fuzz target for line framing and classification.
//!
//! Feeds arbitrary bytes through the line codec and classifies every framed
//! line; neither step may panic.

#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use slirc_client::{LineCodec, ParsedLine};
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    let mut codec = LineCodec::with_max_len(512);
    let mut buf = BytesMut::from(data);
    while let Ok(Some(line)) = codec.decode_eof(&mut buf) {
        if let Ok(parsed) = ParsedLine::parse(&line) {
            if let Some(params) = parsed.params() {
                let _ = params.text();
                let _ = params.subcommand();
            }
        }
    }
});
