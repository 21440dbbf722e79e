//! Rotation Tests
//!
//! Size and age thresholds observed through the registry and the final store.

use crate::common::*;

fn relocate_all(registry: &DiskRegistry, disk: &str) {
    registry.writer_for(disk).unwrap().shutdown();
    assert!(registry.wait_relocated(Duration::from_secs(10)));
}

// ============================================================================
// Size threshold
// ============================================================================

#[test]
fn threshold_event_closes_the_old_segment() {
    let disks = TestDisks::new();
    let mut config = disks.config(&["data1"]);
    config.segment.max_records = 3;
    let registry = DiskRegistry::from_config(&config).unwrap();

    assert!(registry.append("data1", "/d1", "a"));
    assert!(registry.append("data1", "/d1", "b"));
    assert!(registry.append("data1", "/d2", "c"));
    assert!(registry.append("data1", "/d2", "d"));
    relocate_all(&registry, "data1");

    let layout = disks.layout(&config, "data1");
    let segments = read_segments(&layout.list_relocated().unwrap());
    assert_eq!(
        segments,
        vec![vec![
            Record::define(1, "/d1"),
            Record::delete(1, "a"),
            Record::delete(1, "b"),
            Record::define(2, "/d2"),
            Record::delete(2, "c"),
        ]]
    );

    // The fourth event opened the next segment with identifiers reset.
    let active = decode_all(&fs::read(layout.active_path()).unwrap()).unwrap();
    assert_eq!(active, vec![Record::define(1, "/d2"), Record::delete(1, "d")]);
}

#[test]
fn every_segment_defines_before_use() {
    let disks = TestDisks::new();
    let mut config = disks.config(&["data1"]);
    config.segment.max_records = 4;
    let registry = DiskRegistry::from_config(&config).unwrap();

    let mut expected = Vec::new();
    for i in 0..37 {
        let base = format!("/b{}", i % 5);
        let dir = format!("d{}", i);
        assert!(registry.append("data1", &base, &dir));
        expected.push((base, dir));
    }
    relocate_all(&registry, "data1");

    let layout = disks.layout(&config, "data1");
    let mut paths = layout.list_relocated().unwrap();
    assert_eq!(paths.len(), 9);
    paths.push(layout.active_path());

    let mut replayed = Vec::new();
    for segment in read_segments(&paths) {
        let deletes = segment
            .iter()
            .filter(|r| r.kind == RecordKind::DeleteEntry)
            .count();
        assert!(deletes <= 4);
        replayed.extend(events_of(&segment));
    }
    assert_eq!(replayed, expected);
}

// ============================================================================
// Age threshold
// ============================================================================

#[test]
fn age_threshold_rotates_after_the_next_event() {
    let disks = TestDisks::new();
    let mut config = disks.config(&["data1"]);
    config.segment.max_age_secs = 600;
    // Keep the writer from waking up on its own during the test.
    config.segment.idle_check_ms = 60_000;
    let clock = Arc::new(ManualClock::default());
    let registry = DiskRegistry::with_clock(&config, clock.clone()).unwrap();

    assert!(registry.append("data1", "/d1", "a"));
    let writer = registry.writer_for("data1").unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        writer.snapshot().events_applied == 1
    }));

    clock.advance(chrono::Duration::seconds(600));
    assert!(registry.append("data1", "/d1", "b"));
    assert!(registry.append("data1", "/d1", "c"));
    relocate_all(&registry, "data1");

    let layout = disks.layout(&config, "data1");
    let segments = read_segments(&layout.list_relocated().unwrap());
    assert_eq!(
        segments,
        vec![vec![
            Record::define(1, "/d1"),
            Record::delete(1, "a"),
            Record::delete(1, "b"),
        ]]
    );
    let active = decode_all(&fs::read(layout.active_path()).unwrap()).unwrap();
    assert_eq!(active, vec![Record::define(1, "/d1"), Record::delete(1, "c")]);
}

#[test]
fn idle_disk_rotates_once_aged() {
    let disks = TestDisks::new();
    let mut config = disks.config(&["data1"]);
    config.segment.max_age_secs = 600;
    let clock = Arc::new(ManualClock::default());
    let registry = DiskRegistry::with_clock(&config, clock.clone()).unwrap();

    assert!(registry.append("data1", "/d1", "a"));
    let writer = registry.writer_for("data1").unwrap();
    assert!(wait_until(Duration::from_secs(5), || {
        writer.snapshot().events_applied == 1
    }));

    // No further events: the writer has to notice the age on its own.
    clock.advance(chrono::Duration::seconds(3600));
    let layout = disks.layout(&config, "data1");
    assert!(wait_until(Duration::from_secs(10), || {
        layout.list_relocated().map(|p| p.len() == 1).unwrap_or(false)
    }));

    let segments = read_segments(&layout.list_relocated().unwrap());
    assert_eq!(
        segments,
        vec![vec![Record::define(1, "/d1"), Record::delete(1, "a")]]
    );
    assert_eq!(writer.snapshot().segments_rotated, 1);
    registry.shutdown();
    assert!(fs::read(layout.active_path()).unwrap().is_empty());
}

#[test]
fn young_segment_is_not_rotated() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1"]);
    let clock = Arc::new(ManualClock::default());
    let registry = DiskRegistry::with_clock(&config, clock.clone()).unwrap();

    for dir in ["a", "b", "c"] {
        assert!(registry.append("data1", "/d1", dir));
        clock.advance(chrono::Duration::seconds(100));
    }
    relocate_all(&registry, "data1");

    let layout = disks.layout(&config, "data1");
    assert!(layout.list_relocated().unwrap().is_empty());
    assert_eq!(registry.writer_for("data1").unwrap().snapshot().segments_rotated, 0);
}
