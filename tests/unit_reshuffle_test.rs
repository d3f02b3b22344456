use fleetmon::core::snapshot::lists::DirListEntry;
use fleetmon::core::snapshot::manager::{read_list, reshuffle, write_list};
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

fn dir_entry(id: u32, entry_time: i64) -> DirListEntry {
    DirListEntry {
        dir_id: id,
        entry_time,
        dir_alias: format!("d{id}"),
        dir_name: format!("/data/{id}"),
        ..Default::default()
    }
}

async fn old_entries(path: &Path) -> Vec<DirListEntry> {
    read_list(path).await.unwrap_or_default()
}

const RETENTION: Duration = Duration::from_secs(3600);

#[tokio::test]
async fn test_reshuffle_appends_vanished_entries() {
    let dir = TempDir::new().unwrap();
    let old_path = dir.path().join("old_dir_list.x");

    let tmp = vec![dir_entry(1, 1000), dir_entry(2, 1000)];
    let active = vec![dir_entry(2, 1000), dir_entry(3, 2000)];

    reshuffle(&old_path, &tmp, &active, 2000, RETENTION)
        .await
        .unwrap();

    let old = old_entries(&old_path).await;
    // Entry 1 vanished from the active list; entry 2 is still live.
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].dir_id, 1);
}

#[tokio::test]
async fn test_reshuffle_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let old_path = dir.path().join("old_dir_list.x");

    let tmp = vec![dir_entry(1, 1000), dir_entry(2, 1000)];
    let active = vec![dir_entry(2, 1000)];

    reshuffle(&old_path, &tmp, &active, 2000, RETENTION)
        .await
        .unwrap();
    let once = old_entries(&old_path).await;

    reshuffle(&old_path, &tmp, &active, 2000, RETENTION)
        .await
        .unwrap();
    let twice = old_entries(&old_path).await;

    assert_eq!(once, twice);
}

#[tokio::test]
async fn test_reshuffle_purges_entries_past_retention() {
    let dir = TempDir::new().unwrap();
    let old_path = dir.path().join("old_dir_list.x");

    // A stale entry, last seen one retention-and-a-bit before the remote's
    // current data time.
    let stale = vec![dir_entry(9, 1000)];
    write_list(&old_path, &stale).await.unwrap();

    let tmp = vec![dir_entry(1, 5000)];
    let active: Vec<DirListEntry> = Vec::new();
    let last_data_time = 1000 + RETENTION.as_secs() as i64 + 1;

    reshuffle(&old_path, &tmp, &active, last_data_time, RETENTION)
        .await
        .unwrap();

    let old = old_entries(&old_path).await;
    assert_eq!(old.len(), 1);
    assert_eq!(old[0].dir_id, 1);
}

#[tokio::test]
async fn test_reshuffle_with_empty_tmp_is_a_noop() {
    let dir = TempDir::new().unwrap();
    let old_path = dir.path().join("old_dir_list.x");

    let existing = vec![dir_entry(7, 0)];
    write_list(&old_path, &existing).await.unwrap();

    let tmp: Vec<DirListEntry> = Vec::new();
    let active = vec![dir_entry(1, 5000)];
    reshuffle(&old_path, &tmp, &active, i64::MAX, RETENTION)
        .await
        .unwrap();

    // Even the purge is skipped: the file is untouched.
    assert_eq!(old_entries(&old_path).await, existing);
}

#[tokio::test]
async fn test_list_files_round_trip_with_header() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dir_list.x");

    let entries = vec![dir_entry(1, 10), dir_entry(2, 20)];
    write_list(&path, &entries).await.unwrap();
    let loaded: Vec<DirListEntry> = read_list(&path).await.unwrap();
    assert_eq!(loaded, entries);

    // A corrupted count in the header must be rejected.
    let mut bytes = std::fs::read(&path).unwrap();
    bytes[4] = 99;
    std::fs::write(&path, bytes).unwrap();
    assert!(read_list::<DirListEntry>(&path).await.is_err());
}
