//! Registry Tests
//!
//! Routing, concurrent producers and drain-on-shutdown.

use crate::common::*;
use std::thread;

// ============================================================================
// Routing
// ============================================================================

#[test]
fn request_paths_route_to_their_disk() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1", "data2"]);
    let registry = DiskRegistry::from_config(&config).unwrap();

    assert!(registry.append_path("/data1/ns/bucket/obj/a"));
    assert!(registry.append_path("/data2/remote_data/r/s/t/u/obj/b"));
    assert!(registry.append_path("/data1/ns/bucket/obj/c"));
    assert!(!registry.append_path("/data4/ns/bucket/obj/c"));
    assert!(!registry.append_path("/data1/ns"));
    registry.shutdown();

    let d1 = decode_all(&fs::read(disks.layout(&config, "data1").active_path()).unwrap()).unwrap();
    assert_eq!(
        events_of(&d1),
        vec![
            ("/data1/ns/bucket".to_owned(), "/obj/a".to_owned()),
            ("/data1/ns/bucket".to_owned(), "/obj/c".to_owned()),
        ]
    );
    let d2 = decode_all(&fs::read(disks.layout(&config, "data2").active_path()).unwrap()).unwrap();
    assert_eq!(
        events_of(&d2),
        vec![("/data2/remote_data/r/s/t/u".to_owned(), "/obj/b".to_owned())]
    );
}

#[test]
fn discovered_mounts_are_registered() {
    let disks = TestDisks::new();
    fs::create_dir(disks.mount("data1")).unwrap();
    fs::create_dir(disks.mount("data3")).unwrap();

    let mut config = disks.config(&[]);
    config.discovery = Some(DiscoveryConfig {
        prefix: format!("{}/data", disks.root().display()),
        max_index: 4,
    });
    let registry = DiskRegistry::from_config(&config).unwrap();

    let ids: Vec<_> = registry.disks().map(|d| d.to_string()).collect();
    assert_eq!(ids, vec!["data1", "data3"]);
    assert!(registry.append_path("/data3/ns/b/x"));
    assert!(!registry.append_path("/data2/ns/b/x"));
    assert!(disks.mount("data3").join("mfd-manager-files").is_dir());
}

// ============================================================================
// Producers
// ============================================================================

#[test]
fn concurrent_producers_keep_their_order() {
    let disks = TestDisks::new();
    let mut config = disks.config(&["data1", "data2"]);
    config.segment.max_records = 50;
    config.queue_capacity = 8192;
    let registry = Arc::new(DiskRegistry::from_config(&config).unwrap());

    let producers: Vec<_> = (0..8)
        .map(|p| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let disk = if p % 2 == 0 { "data1" } else { "data2" };
                let base = format!("/{}/producer/{}", disk, p);
                for i in 0..200 {
                    assert!(registry.append(disk, &base, &format!("/{:04}", i)));
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    for disk in ["data1", "data2"] {
        registry.writer_for(disk).unwrap().shutdown();
    }
    assert!(registry.wait_relocated(Duration::from_secs(20)));

    for disk in ["data1", "data2"] {
        let layout = disks.layout(&config, disk);
        let mut paths = layout.list_relocated().unwrap();
        paths.push(layout.active_path());

        let mut per_base: std::collections::BTreeMap<String, Vec<String>> = Default::default();
        for segment in read_segments(&paths) {
            for (base, dir) in events_of(&segment) {
                per_base.entry(base).or_default().push(dir);
            }
        }
        assert_eq!(per_base.len(), 4);
        for dirs in per_base.values() {
            let expected: Vec<_> = (0..200).map(|i| format!("/{:04}", i)).collect();
            assert_eq!(dirs, &expected);
        }
        let snap = registry.writer_for(disk).unwrap().snapshot();
        assert_eq!(snap.events_applied, 800);
        assert_eq!(snap.segments_rotated, 16);
    }
}

#[test]
fn shutdown_applies_every_accepted_event() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1"]);
    let registry = DiskRegistry::from_config(&config).unwrap();

    let mut accepted = 0;
    for i in 0..1000 {
        if registry.append("data1", "/data1/ns/b", &format!("/{}", i)) {
            accepted += 1;
        }
    }
    registry.shutdown();

    let records = decode_all(&fs::read(disks.layout(&config, "data1").active_path()).unwrap()).unwrap();
    assert_eq!(events_of(&records).len(), accepted);
    assert!(!registry.append("data1", "/data1/ns/b", "/late"));
}
