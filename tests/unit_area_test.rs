use fleetmon::config::{Endpoint, SiteConfig};
use fleetmon::core::status::area::decode_area;
use fleetmon::core::status::{ConnectStatus, StatusArea};
use std::collections::HashMap;
use tempfile::TempDir;

fn site(alias: &str) -> SiteConfig {
    SiteConfig {
        alias: alias.to_string(),
        endpoints: [
            Endpoint {
                host: format!("{alias}-a.example"),
                port: 4444,
            },
            Endpoint {
                host: format!("{alias}-b.example"),
                port: 4445,
            },
        ],
        command: "ssh".into(),
        poll_interval: 5,
        connect_time: 0,
        disconnect_time: 0,
        options: Default::default(),
    }
}

#[tokio::test]
async fn test_published_area_restores_records() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status_area");

    let area = StatusArea::create(&[site("alpha"), site("beta")], &HashMap::new());
    {
        let mut record = area.record(0).lock();
        record.tr = 42;
        record.top_tr = [42, 0, 0, 0, 0, 0, 0];
        record.connect_status = ConnectStatus::Established;
        record.remote_version = "1.4.5".into();
    }
    area.write_to(&path).await.unwrap();

    let records = decode_area(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].alias, "alpha");
    assert_eq!(records[0].tr, 42);
    assert_eq!(records[0].top_tr[0], 42);
    assert_eq!(records[0].connect_status, ConnectStatus::Established);
    assert_eq!(records[0].remote_version, "1.4.5");
    assert_eq!(records[0].endpoints[1].port, 4445);
}

#[tokio::test]
async fn test_attach_inherits_history_by_alias() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status_area");

    let area = StatusArea::create(&[site("alpha"), site("beta")], &HashMap::new());
    {
        let mut record = area.record(1).lock();
        record.top_fr = [9; 7];
        record.files_send.set_current(500);
        record.files_send.seed();
    }
    area.write_to(&path).await.unwrap();

    // The reloaded configuration drops alpha and adds gamma; beta survives.
    let reattached = StatusArea::attach(&path, &[site("beta"), site("gamma")]).await;
    assert_eq!(reattached.len(), 2);
    assert_eq!(reattached.record(0).lock().top_fr, [9; 7]);
    assert_eq!(reattached.record(0).lock().files_send.slots, [500; 6]);
    assert_eq!(reattached.record(1).lock().top_fr, [0; 7]);
}

#[tokio::test]
async fn test_corrupted_area_file_is_ignored_on_attach() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("status_area");

    let area = StatusArea::create(&[site("alpha")], &HashMap::new());
    area.record(0).lock().top_tr = [7; 7];
    area.write_to(&path).await.unwrap();

    let mut bytes = std::fs::read(&path).unwrap();
    let len = bytes.len();
    bytes[len / 2] ^= 0xff;
    std::fs::write(&path, bytes).unwrap();

    // A checksum mismatch falls back to fresh records.
    let reattached = StatusArea::attach(&path, &[site("alpha")]).await;
    assert_eq!(reattached.record(0).lock().top_tr, [0; 7]);
}

#[test]
fn test_rebuild_preserves_by_alias_and_drops_removed_sites() {
    let area = StatusArea::create(&[site("alpha"), site("beta")], &HashMap::new());
    area.record(0).lock().toggle = 1;

    let rebuilt = area.rebuild(&[site("alpha")]);
    assert_eq!(rebuilt.len(), 1);
    assert_eq!(rebuilt.record(0).lock().toggle, 1);
}
