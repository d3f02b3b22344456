use fleetmon::core::FleetMonError;
use fleetmon::core::constants::{ERROR_HISTORY_LENGTH, NO_INFORMATION};
use fleetmon::core::protocol::{TagParser, Update};
use fleetmon::core::snapshot::lists::alias_checksum;

fn parse(line: &[u8]) -> Update {
    TagParser::new().parse(line).expect("message should parse")
}

#[test]
fn test_parse_interval_summary_required_fields() {
    let update = parse(b"IS 3 12345 42 1 0 0 2 5\0");
    let Update::IntervalSummary(is) = update else {
        panic!("expected an interval summary, got {update:?}");
    };
    assert_eq!(is.fc, Some(3));
    assert_eq!(is.fs, Some(12345));
    assert_eq!(is.tr, Some(42));
    assert_eq!(is.fr, Some(1));
    assert_eq!(is.ec, Some(0));
    assert_eq!(is.host_error_counter, Some(0));
    assert_eq!(is.no_of_transfers, Some(2));
    assert_eq!(is.jobs_in_queue, Some(5));
    // Missing trailing counters are "not present", not zero.
    assert_eq!(is.files_send, None);
    assert_eq!(is.bytes_received, None);
}

#[test]
fn test_parse_interval_summary_with_counters() {
    let update = parse(b"IS 1 2 3 4 5 6 7 8 100 2000 30 4 50 6000\0");
    let Update::IntervalSummary(is) = update else {
        panic!("expected an interval summary");
    };
    assert_eq!(is.files_send, Some(100));
    assert_eq!(is.bytes_send, Some(2000));
    assert_eq!(is.connections, Some(30));
    assert_eq!(is.total_errors, Some(4));
    assert_eq!(is.files_received, Some(50));
    assert_eq!(is.bytes_received, Some(6000));
}

#[test]
fn test_parse_interval_summary_rejects_garbage_in_present_field() {
    let err = TagParser::new().parse(b"IS 3 bogus 42\0").unwrap_err();
    assert_eq!(
        err,
        FleetMonError::BadField {
            tag: "IS",
            field: "fs"
        }
    );
}

#[test]
fn test_parse_counts_and_scalars() {
    assert_eq!(parse(b"NH 2\0"), Update::HostCount(2));
    assert_eq!(parse(b"ND 17\0"), Update::DirCount(17));
    assert_eq!(parse(b"NJ 170\0"), Update::JobCount(170));
    assert_eq!(parse(b"MC 20\0"), Update::MaxConnections(20));
    assert_eq!(parse(b"AM 1\0"), Update::AmgStatus(1));
    assert_eq!(parse(b"FD 0\0"), Update::FdStatus(0));
    assert_eq!(parse(b"AW -1\0"), Update::ArchiveWatchStatus(-1));
    assert_eq!(parse(b"DJ 4000\0"), Update::DangerNoOfJobs(4000));
    assert_eq!(parse(b"LC 11\0"), Update::LogCapabilities(11));
}

#[test]
fn test_parse_version_and_work_dir() {
    assert_eq!(parse(b"AV 1.4.5\0"), Update::Version("1.4.5".into()));
    assert_eq!(
        parse(b"WD /opt/remote/data\0"),
        Update::WorkDir("/opt/remote/data".into())
    );
}

#[test]
fn test_parse_version_is_truncated_to_limit() {
    let long = "v".repeat(100);
    let line = format!("AV {long}\0");
    let Update::Version(v) = parse(line.as_bytes()) else {
        panic!("expected a version");
    };
    assert_eq!(v.len(), fleetmon::core::constants::MAX_VERSION_LENGTH);
}

#[test]
fn test_parse_typesize_vector() {
    assert_eq!(
        parse(b"TD 30 256 40 70\0"),
        Update::Typesize(vec![30, 256, 40, 70])
    );
}

#[test]
fn test_parse_host_list_entry() {
    let Update::HostListEntry { pos, entry } = parse(b"HL 0 alpha host-a.example\0") else {
        panic!("expected a host entry");
    };
    assert_eq!(pos, 0);
    assert_eq!(entry.alias, "alpha");
    assert_eq!(entry.primary_real_hostname, "host-a.example");
    assert_eq!(entry.secondary_real_hostname, "");
    assert_eq!(entry.host_id, alias_checksum("alpha"));
    assert!(!entry.is_group());
}

#[test]
fn test_parse_host_list_entry_without_real_hostname_is_group() {
    let Update::HostListEntry { entry, .. } = parse(b"HL 3 backbone\0") else {
        panic!("expected a host entry");
    };
    assert!(entry.is_group());
}

#[test]
fn test_parse_dir_list_entry() {
    let Update::DirListEntry { pos, entry } =
        parse(b"DL 1 3f2a alpha /data/in /data/in.orig anon 1c\0")
    else {
        panic!("expected a directory entry");
    };
    assert_eq!(pos, 1);
    assert_eq!(entry.dir_id, 0x3f2a);
    assert_eq!(entry.dir_alias, "alpha");
    assert_eq!(entry.dir_name, "/data/in");
    assert_eq!(entry.original_dir_name, "/data/in.orig");
    assert_eq!(entry.home_dir_user, "anon");
    assert_eq!(entry.home_dir_length, 0x1c);
}

#[test]
fn test_parse_dir_list_entry_short_form() {
    let Update::DirListEntry { entry, .. } = parse(b"DL 0 a1 in /data/in\0") else {
        panic!("expected a directory entry");
    };
    assert_eq!(entry.original_dir_name, "");
    assert_eq!(entry.home_dir_user, "");
    assert_eq!(entry.home_dir_length, 0);
}

#[test]
fn test_parse_job_list_entry_plain() {
    let Update::JobListEntry { pos, entry } =
        parse(b"JL 2 dead beef 3 5 ftp://user@host/dir\0")
    else {
        panic!("expected a job entry");
    };
    assert_eq!(pos, 2);
    assert_eq!(entry.job_id, 0xdead);
    assert_eq!(entry.dir_id, 0xbeef);
    assert_eq!(entry.no_of_loptions, 3);
    assert_eq!(entry.priority, b'5');
    assert_eq!(entry.recipient, "ftp://user@host/dir");
}

#[test]
fn test_parse_error_history_zero_fills_tail() {
    let Update::ErrorHistory { host_pos, history } = parse(b"EL 1 4 0 2\0") else {
        panic!("expected an error history");
    };
    assert_eq!(host_pos, 1);
    assert_eq!(&history[..3], &[4, 0, 2]);
    assert_eq!(&history[3..], &[0u8; ERROR_HISTORY_LENGTH - 3]);
}

#[test]
fn test_parse_receive_history_decodes_severities() {
    // Each byte is severity + ' '; severity 0 is a space itself.
    let line = [b'R', b'H', b' ', b' ' + 1, b' ', b' ' + 3, 0];
    let Update::ReceiveHistory(bytes) = TagParser::new().parse(&line).expect("parse") else {
        panic!("expected a receive history");
    };
    assert_eq!(bytes, vec![1, 0, 3]);
}

#[test]
fn test_parse_history_maps_unknown_severity_to_no_information() {
    let line = [b'T', b'H', b' ', b' ' + 99, b' ' + 2, 0];
    let Update::TransferHistory(bytes) = TagParser::new().parse(&line).expect("parse") else {
        panic!("expected a transfer history");
    };
    assert_eq!(bytes, vec![NO_INFORMATION, 2]);
}

#[test]
fn test_parse_system_radar() {
    let line = [b'S', b'R', b' ', b'4', b'2', b' ', b' ' + 5, b' ' + 1, b' ', 0];
    let Update::SystemRadar {
        entry_counter,
        fifo,
    } = TagParser::new().parse(&line).expect("parse")
    else {
        panic!("expected a system radar");
    };
    assert_eq!(entry_counter, 42);
    assert_eq!(fifo, vec![5, 1, 0]);
}

#[test]
fn test_parse_numeric_command_status() {
    assert_eq!(parse(b"211- FleetMon status\0"), Update::CommandReply(211));
    assert_eq!(parse(b"200- OK\0"), Update::CommandReply(200));
}

#[test]
fn test_parse_remote_shutdown_literal() {
    assert_eq!(parse(b"500- Shutdown\0"), Update::RemoteShutdown);
}

#[test]
fn test_parse_unknown_tag_is_an_error() {
    let err = TagParser::new().parse(b"XX 1 2 3\0").unwrap_err();
    assert_eq!(err, FleetMonError::UnknownTag("XX".into()));
}
