//! Restart Recovery Tests
//!
//! A process that dies leaves an active segment, finalized segments and
//! maybe a half-copied temp file behind. The next start must relocate all
//! of it, each segment exactly once.

use crate::common::*;

fn segment_bytes(base: &str, dirs: &[&str]) -> Vec<u8> {
    let mut bytes = Vec::new();
    encode_record(RecordKind::DefineBasePath, 1, base.as_bytes(), &mut bytes).unwrap();
    for dir in dirs {
        encode_record(RecordKind::DeleteEntry, 1, dir.as_bytes(), &mut bytes).unwrap();
    }
    bytes
}

#[test]
fn restart_relocates_everything_left_behind() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1"]);
    let layout = disks.layout(&config, "data1");
    fs::create_dir_all(layout.staging_dir()).unwrap();
    fs::create_dir_all(layout.final_dir()).unwrap();

    let leftover_active = segment_bytes("/data1/a/b", &["/x"]);
    let staged = segment_bytes("/data1/c/d", &["/y", "/z"]);
    fs::write(layout.active_path(), &leftover_active).unwrap();
    fs::write(layout.staging_path("active-5.mfd"), &staged).unwrap();
    // Half-copied temp file of the staged segment
    fs::write(layout.tmp_path("active-5.mfd"), &staged[..3]).unwrap();

    let registry = DiskRegistry::from_config(&config).unwrap();
    assert!(registry.wait_relocated(Duration::from_secs(10)));

    let relocated = layout.list_relocated().unwrap();
    assert_eq!(relocated.len(), 2);
    assert_eq!(relocated[0], layout.final_path("active-5.mfd"));
    let contents = read_segments(&relocated);
    assert_eq!(contents[0], decode_all(&staged).unwrap());
    assert_eq!(contents[1], decode_all(&leftover_active).unwrap());

    assert_eq!(disks.names_in(layout.staging_dir()), vec!["active.mfd"]);
    assert!(!layout.tmp_path("active-5.mfd").exists());
    assert_eq!(registry.relocation_stats().completed, 2);

    // The new active segment starts fresh.
    assert!(registry.append("data1", "/data1/a/b", "/w"));
    registry.shutdown();
    let active = decode_all(&fs::read(layout.active_path()).unwrap()).unwrap();
    assert_eq!(active, vec![Record::define(1, "/data1/a/b"), Record::delete(1, "/w")]);
}

#[test]
fn graceful_restart_continues_where_it_stopped() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1"]);
    let layout = disks.layout(&config, "data1");

    {
        let registry = DiskRegistry::from_config(&config).unwrap();
        assert!(registry.append("data1", "/data1/a/b", "/1"));
        assert!(registry.append("data1", "/data1/a/b", "/2"));
        registry.shutdown();
    }
    assert!(layout.list_relocated().unwrap().is_empty());

    let registry = DiskRegistry::from_config(&config).unwrap();
    assert!(registry.append("data1", "/data1/a/b", "/3"));
    registry.writer_for("data1").unwrap().shutdown();
    assert!(registry.wait_relocated(Duration::from_secs(10)));

    let relocated = read_segments(&layout.list_relocated().unwrap());
    assert_eq!(relocated.len(), 1);
    assert_eq!(
        events_of(&relocated[0]),
        vec![
            ("/data1/a/b".to_owned(), "/1".to_owned()),
            ("/data1/a/b".to_owned(), "/2".to_owned()),
        ]
    );
    let active = decode_all(&fs::read(layout.active_path()).unwrap()).unwrap();
    assert_eq!(events_of(&active), vec![("/data1/a/b".to_owned(), "/3".to_owned())]);
}

#[test]
fn unreadable_mount_fails_only_that_disk() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1", "data2"]);
    fs::write(disks.mount("data2"), b"not a mount").unwrap();

    let registry = DiskRegistry::from_config(&config).unwrap();
    assert_eq!(registry.failed_disks(), &[DiskId::new("data2")]);
    assert!(registry.append_path("/data1/ns/b/x"));
    assert!(!registry.append_path("/data2/ns/b/x"));
}
