use fleetmon::core::protocol::deobfuscate::{deobfuscate_recipient, obfuscate_recipient};
use fleetmon::core::protocol::{TagParser, Update};

#[test]
fn test_masked_job_list_recipient_is_recovered() {
    let recipient = b"sftp://collector@archive.example:22/incoming";
    let mut masked = recipient.to_vec();
    obfuscate_recipient(&mut masked);

    let mut line = b"Jl 0 1a2b 3c4d 2 9 ".to_vec();
    line.extend_from_slice(&masked);
    line.push(0);

    let Update::JobListEntry { entry, .. } = TagParser::new().parse(&line).expect("parse") else {
        panic!("expected a job entry");
    };
    assert_eq!(entry.recipient.as_bytes(), recipient);
}

#[test]
fn test_uppercase_variant_passes_recipient_through() {
    let line = b"JL 0 1a2b 3c4d 2 9 ftp://plain@host/dir\0";
    let Update::JobListEntry { entry, .. } = TagParser::new().parse(line).expect("parse") else {
        panic!("expected a job entry");
    };
    assert_eq!(entry.recipient, "ftp://plain@host/dir");
}

#[test]
fn test_mask_depends_on_position() {
    // The same byte at different positions must mask differently within a
    // block, and identically one full mask period apart.
    let mut block = vec![b'A'; 84 + 1];
    obfuscate_recipient(&mut block);
    assert_ne!(block[0], block[1]);
    assert_eq!(block[0], block[84]);
}

#[test]
fn test_round_trip_is_identity_for_long_recipients() {
    let recipient: Vec<u8> = (0..=255u8).cycle().take(300).collect();
    let mut buf = recipient.clone();
    obfuscate_recipient(&mut buf);
    deobfuscate_recipient(&mut buf);
    assert_eq!(buf, recipient);
}
