use fleetmon::core::constants::{MAX_RESTART_COUNT, RETRY_INTERVAL};
use fleetmon::core::supervisor::process::{
    ExitDisposition, ProcessEntry, ProcessTable, WorkerKind,
};
use std::time::Instant;

fn entry() -> ProcessEntry {
    ProcessEntry::new("lab".into(), 0, WorkerKind::PollClient)
}

#[test]
fn test_clean_exit_is_not_restarted() {
    let mut e = entry();
    e.mark_started(1);
    e.mark_exit(ExitDisposition::Clean);
    assert!(!e.running);
    assert!(e.next_retry.is_none());
    assert!(!e.due_for_restart(Instant::now() + RETRY_INTERVAL * 2));
}

#[test]
fn test_remote_shutdown_schedules_retry_without_burning_a_restart() {
    let mut e = entry();
    e.mark_started(1);
    e.mark_exit(ExitDisposition::RemoteShutdown);
    assert_eq!(e.restart_count, 0);
    let retry = e.next_retry.expect("retry scheduled");
    assert!(!e.due_for_restart(Instant::now()));
    assert!(e.due_for_restart(retry));
}

#[test]
fn test_rapid_crashes_increment_the_restart_counter() {
    let mut e = entry();
    e.mark_started(1);
    // First crash: no previous death, counter stays.
    e.mark_exit(ExitDisposition::Crash);
    assert_eq!(e.restart_count, 0);
    // Second crash within the window: counted.
    e.mark_started(2);
    e.mark_exit(ExitDisposition::Crash);
    assert_eq!(e.restart_count, 1);
}

#[test]
fn test_crash_loop_gives_up_after_the_limit() {
    let mut e = entry();
    for generation in 0..(MAX_RESTART_COUNT as u64 + 5) {
        e.mark_started(generation);
        e.mark_exit(ExitDisposition::Crash);
    }
    assert!(e.gave_up);
    assert!(e.next_retry.is_none());
    assert!(!e.due_for_restart(Instant::now() + RETRY_INTERVAL * 10));
}

#[test]
fn test_table_replaces_entry_for_same_site_and_kind() {
    let mut table = ProcessTable::default();
    table.insert(entry());
    let mut second = entry();
    second.mark_started(7);
    table.insert(second);

    let stored = table.get(0, WorkerKind::PollClient).expect("entry");
    assert_eq!(stored.generation, 7);
    assert_eq!(table.entries().len(), 1);
}

#[test]
fn test_table_keeps_kinds_apart() {
    let mut table = ProcessTable::default();
    table.insert(entry());
    table.insert(ProcessEntry::new("lab".into(), 0, WorkerKind::LogForwarder));
    assert_eq!(table.entries().len(), 2);
    assert!(table.get(0, WorkerKind::LogForwarder).is_some());
}
