use fleetmon::config::{Endpoint, SiteConfig};
use fleetmon::core::protocol::{TagParser, Update};
use fleetmon::core::status::record::{SiteRecord, SpecialFlags};
use fleetmon::core::status::{CounterRing, RingSlot};

fn test_site(alias: &str) -> SiteConfig {
    SiteConfig {
        alias: alias.to_string(),
        endpoints: [
            Endpoint {
                host: "host-a.example".into(),
                port: 4444,
            },
            Endpoint {
                host: "host-b.example".into(),
                port: 4444,
            },
        ],
        command: "ssh".into(),
        poll_interval: 5,
        connect_time: 0,
        disconnect_time: 0,
        options: Default::default(),
    }
}

fn apply(record: &mut SiteRecord, line: &[u8]) {
    let update = TagParser::new().parse(line).expect("parse");
    record.last_data_time = 1_700_000_000;
    record.apply(&update, record.last_data_time / 3600);
}

#[test]
fn test_ring_delta_and_rebase() {
    let mut ring = CounterRing::default();
    ring.set_current(100);
    ring.seed();

    ring.set_current(150);
    assert_eq!(ring.take_delta(RingSlot::Hour), (50, false));
    // The hour baseline is rebased, the day baseline is not.
    assert_eq!(ring.slots[RingSlot::Hour as usize], 150);
    assert_eq!(ring.slots[RingSlot::Day as usize], 100);
    assert_eq!(ring.take_delta(RingSlot::Day), (50, false));
}

#[test]
fn test_ring_rollover_produces_one_zero_delta() {
    let mut ring = CounterRing::default();
    ring.set_current(1000);
    ring.seed();

    // The remote restarted: its counter dropped below the baseline.
    ring.set_current(10);
    assert_eq!(ring.take_delta(RingSlot::Hour), (0, true));

    // The baseline was re-seeded, so counting resumes normally.
    ring.set_current(60);
    assert_eq!(ring.take_delta(RingSlot::Hour), (50, false));
}

#[test]
fn test_first_interval_summary_seeds_all_baselines() {
    let mut record = SiteRecord::from_config(&test_site("seed"));
    assert!(!record.special_flag.contains(SpecialFlags::COUNTERS_INITIALIZED));

    apply(&mut record, b"IS 1 2 3 4 5 6 7 8 100 2000 30 4 50 6000\0");

    assert!(record.special_flag.contains(SpecialFlags::COUNTERS_INITIALIZED));
    assert_eq!(record.files_send.slots, [100; 6]);
    assert_eq!(record.bytes_send.slots, [2000; 6]);
    assert_eq!(record.connections.slots, [30; 6]);

    // The second summary only moves slot 0.
    apply(&mut record, b"IS 1 2 3 4 5 6 7 8 120 2500 31 4 50 6000\0");
    assert_eq!(record.files_send.slots[0], 120);
    assert_eq!(record.files_send.slots[1], 100);
}

#[test]
fn test_interval_summary_updates_live_fields_and_tops() {
    let mut record = SiteRecord::from_config(&test_site("cold"));
    apply(&mut record, b"IS 3 12345 42 1 0 0 2 5\0");

    assert_eq!(record.fc, 3);
    assert_eq!(record.fs, 12345);
    assert_eq!(record.tr, 42);
    assert_eq!(record.fr, 1);
    assert_eq!(record.ec, 0);
    assert_eq!(record.host_error_counter, 0);
    assert_eq!(record.no_of_transfers, 2);
    assert_eq!(record.jobs_in_queue, 5);
    assert_eq!(record.top_tr[0], 42);
    assert_eq!(record.top_tr_time, record.last_data_time);

    // A lower rate does not displace the running maximum.
    apply(&mut record, b"IS 3 12345 17 1 0 0 2 5\0");
    assert_eq!(record.tr, 17);
    assert_eq!(record.top_tr[0], 42);
}

#[test]
fn test_missing_trailing_fields_leave_record_unchanged() {
    let mut record = SiteRecord::from_config(&test_site("short"));
    apply(&mut record, b"IS 1 2 3 4 5 6 7 8 100 2000 30 4 50 6000\0");

    // A short summary must not clobber the counter rings.
    apply(&mut record, b"IS 9 9 9 9 9 9 9 9\0");
    assert_eq!(record.fc, 9);
    assert_eq!(record.files_send.slots[0], 100);
    assert_eq!(record.bytes_received.slots[0], 6000);
}
