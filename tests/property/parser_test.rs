//! Parser purity: replaying any sequence of well-formed messages through a
//! freshly initialized site record must produce the same final record no
//! matter how the wire bytes were chunked into reads.

use bytes::BytesMut;
use fleetmon::config::{Endpoint, SiteConfig};
use fleetmon::core::protocol::{TagLineCodec, TagParser};
use fleetmon::core::status::SiteRecord;
use proptest::prelude::*;
use tokio_util::codec::Decoder;

fn fresh_record() -> SiteRecord {
    SiteRecord::from_config(&SiteConfig {
        alias: "prop".into(),
        endpoints: [
            Endpoint {
                host: "prop.example".into(),
                port: 4444,
            },
            Endpoint {
                host: "prop.example".into(),
                port: 4444,
            },
        ],
        command: "ssh".into(),
        poll_interval: 5,
        connect_time: 0,
        disconnect_time: 0,
        options: Default::default(),
    })
}

fn is_message() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(any::<u32>(), 8..=14)
        .prop_map(|values| {
            let fields: Vec<String> = values.iter().map(u32::to_string).collect();
            format!("IS {}\r\n", fields.join(" ")).into_bytes()
        })
}

fn version_message() -> impl Strategy<Value = Vec<u8>> {
    "[a-z0-9.]{1,20}".prop_map(|v| format!("AV {v}\r\n").into_bytes())
}

fn history_message() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0u8..=7, 1..=48).prop_map(|severities| {
        let mut line = b"RH ".to_vec();
        line.extend(severities.iter().map(|s| s + b' '));
        line.extend_from_slice(b"\r\n");
        line
    })
}

fn scalar_message() -> impl Strategy<Value = Vec<u8>> {
    (0u8..4, any::<u16>()).prop_map(|(kind, value)| {
        let tag = ["MC", "DJ", "NH", "ND"][kind as usize];
        format!("{tag} {value}\r\n").into_bytes()
    })
}

fn message() -> impl Strategy<Value = Vec<u8>> {
    prop_oneof![
        is_message(),
        version_message(),
        history_message(),
        scalar_message(),
    ]
}

/// Runs the wire bytes through the codec in `chunk`-sized reads and applies
/// every update to a fresh record.
fn replay(wire: &[u8], chunk: usize) -> SiteRecord {
    let mut codec = TagLineCodec;
    let mut parser = TagParser::new();
    let mut record = fresh_record();
    record.last_data_time = 1_700_000_000;

    let mut buf = BytesMut::new();
    for piece in wire.chunks(chunk.max(1)) {
        buf.extend_from_slice(piece);
        while let Some(frame) = codec.decode(&mut buf).expect("well-formed wire") {
            let update = parser.parse(&frame).expect("well-formed message");
            record.apply(&update, record.last_data_time / 3600);
        }
    }
    record
}

proptest! {
    #[test]
    fn final_record_is_independent_of_read_chunking(
        messages in proptest::collection::vec(message(), 1..20),
        chunk in 1usize..64,
    ) {
        let wire: Vec<u8> = messages.concat();
        let baseline = replay(&wire, wire.len());
        let chunked = replay(&wire, chunk);
        prop_assert_eq!(baseline, chunked);
    }

    #[test]
    fn byte_at_a_time_equals_one_shot(messages in proptest::collection::vec(message(), 1..8)) {
        let wire: Vec<u8> = messages.concat();
        prop_assert_eq!(replay(&wire, wire.len()), replay(&wire, 1));
    }
}
