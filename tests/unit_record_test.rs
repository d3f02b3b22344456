use fleetmon::config::{Endpoint, SiteConfig};
use fleetmon::core::constants::{LOG_FIFO_SIZE, MAX_LOG_HISTORY, NO_INFORMATION, STORAGE_TIME};
use fleetmon::core::protocol::Update;
use fleetmon::core::status::SiteRecord;

fn test_record() -> SiteRecord {
    SiteRecord::from_config(&SiteConfig {
        alias: "hist".into(),
        endpoints: [
            Endpoint {
                host: "host-a.example".into(),
                port: 4444,
            },
            Endpoint {
                host: "host-a.example".into(),
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

#[test]
fn test_full_history_update_replaces_window() {
    let mut record = test_record();
    let bytes: Vec<u8> = (0..MAX_LOG_HISTORY).map(|i| (i % 7) as u8).collect();
    record.apply(&Update::ReceiveHistory(bytes.clone()), 100);
    assert_eq!(&record.log_history[0][..], &bytes[..]);
}

#[test]
fn test_short_history_shifts_once_per_hour() {
    let mut record = test_record();
    let full: Vec<u8> = vec![2; MAX_LOG_HISTORY];
    record.apply(&Update::ReceiveHistory(full), 100);

    // First short update in hour 101: shift left once, right-align.
    record.apply(&Update::ReceiveHistory(vec![5, 6]), 101);
    assert_eq!(record.log_history[0][0], 2);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 2], 5);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 1], 6);

    // Second short update in the same hour: no second shift.
    record.apply(&Update::ReceiveHistory(vec![3]), 101);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 2], 5);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 1], 3);

    // A new hour shifts again.
    record.apply(&Update::ReceiveHistory(vec![4]), 102);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 3], 5);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 2], 3);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 1], 4);
}

#[test]
fn test_history_categories_shift_independently() {
    let mut record = test_record();
    record.apply(&Update::ReceiveHistory(vec![1]), 50);
    record.apply(&Update::TransferHistory(vec![2]), 50);
    assert_eq!(record.log_history[0][MAX_LOG_HISTORY - 1], 1);
    assert_eq!(record.log_history[1][MAX_LOG_HISTORY - 1], 2);
    assert_eq!(record.log_history[2], [NO_INFORMATION; MAX_LOG_HISTORY]);
}

#[test]
fn test_system_radar_fills_fifo_and_counter() {
    let mut record = test_record();
    record.apply(
        &Update::SystemRadar {
            entry_counter: 9,
            fifo: vec![4, 5, 6],
        },
        0,
    );
    assert_eq!(record.log_entry_counter, 9);
    assert_eq!(&record.log_fifo[..3], &[4, 5, 6]);
}

#[test]
fn test_push_log_severity_rotates_fifo() {
    let mut record = test_record();
    for severity in 1..=(LOG_FIFO_SIZE as u8 + 2) {
        record.push_log_severity(severity);
    }
    assert_eq!(record.log_fifo[LOG_FIFO_SIZE - 1], LOG_FIFO_SIZE as u8 + 2);
    assert_eq!(record.log_fifo[0], 3);
    assert_eq!(record.log_entry_counter, LOG_FIFO_SIZE as u32 + 2);
}

#[test]
fn test_rotate_tops_shifts_right_and_clears_slot_zero() {
    let mut record = test_record();
    record.top_tr = [100, 80, 60, 40, 20, 10, 5];
    record.top_tr_time = 12345;

    record.rotate_tops();

    assert_eq!(record.top_tr, [0, 100, 80, 60, 40, 20, 10]);
    assert_eq!(record.top_tr_time, 0);
    assert_eq!(record.top_fr, [0; STORAGE_TIME]);
}

#[test]
fn test_inherit_preserves_history_but_not_live_state() {
    let mut previous = test_record();
    previous.top_tr = [7; STORAGE_TIME];
    previous.files_send.set_current(99);
    previous.files_send.seed();
    previous.toggle = 1;
    previous.fc = 42;

    let mut fresh = test_record();
    fresh.inherit(&previous);

    assert_eq!(fresh.top_tr, [7; STORAGE_TIME]);
    assert_eq!(fresh.files_send.slots, [99; 6]);
    assert_eq!(fresh.toggle, 1);
    // Live session fields start over.
    assert_eq!(fresh.fc, 0);
}
