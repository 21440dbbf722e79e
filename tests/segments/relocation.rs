//! Relocation Tests
//!
//! Copy + rename into the final store under injected failures. A reader of
//! the final store must never see a partial segment.

use crate::common::*;
use mfdlog_durability::relocate_until_done;
use mfdlog_durability::RelocationStats;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn staged_segment(disks: &TestDisks, name: &str, records: usize) -> (DiskLayout, RelocationJob, Vec<u8>) {
    let config = disks.config(&["data1"]);
    let layout = disks.layout(&config, "data1");
    fs::create_dir_all(layout.staging_dir()).unwrap();

    let mut bytes = Vec::new();
    encode_record(RecordKind::DefineBasePath, 1, b"/data1/ns/b", &mut bytes).unwrap();
    for i in 0..records {
        let dir = format!("/dir{}", i);
        encode_record(RecordKind::DeleteEntry, 1, dir.as_bytes(), &mut bytes).unwrap();
    }
    fs::write(layout.staging_path(name), &bytes).unwrap();

    let job = RelocationJob::new(&layout, name);
    (layout, job, bytes)
}

/// Watch `dest` until stopped; fail if it is ever visible with the wrong size
fn watch_final_name(dest: PathBuf, expected: u64, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Acquire) {
            if let Ok(meta) = fs::metadata(&dest) {
                assert_eq!(meta.len(), expected, "partial segment visible under final name");
            }
            thread::yield_now();
        }
    })
}

#[test]
fn missing_final_dir_is_retried_until_it_appears() {
    let disks = TestDisks::new();
    let (layout, job, bytes) = staged_segment(&disks, "active-10.mfd", 500);
    assert!(!layout.final_dir().exists());

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = watch_final_name(job.dest.clone(), bytes.len() as u64, stop.clone());

    let final_dir = layout.final_dir().to_path_buf();
    let fixer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        fs::create_dir_all(final_dir).unwrap();
    });

    let stats = RelocationStats::default();
    let done = relocate_until_done(
        &job,
        Duration::from_millis(10),
        &ShutdownSignal::new(),
        &stats,
    );
    fixer.join().unwrap();
    stop.store(true, Ordering::Release);
    watcher.join().unwrap();

    assert!(done);
    assert!(stats.snapshot().failed_attempts >= 1);
    assert_eq!(fs::read(&job.dest).unwrap(), bytes);
    assert!(!job.source.exists());
    assert!(!job.tmp.exists());
    assert_eq!(disks.names_in(layout.final_dir()), vec!["active-10.mfd"]);
}

#[test]
fn failing_copy_leaves_nothing_under_the_final_name() {
    let disks = TestDisks::new();
    let (layout, job, bytes) = staged_segment(&disks, "active-20.mfd", 200);
    fs::create_dir_all(layout.final_dir()).unwrap();

    // A directory squatting on the temp path makes every attempt fail
    // after the source was opened.
    fs::create_dir(&job.tmp).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = watch_final_name(job.dest.clone(), bytes.len() as u64, stop.clone());

    let tmp = job.tmp.clone();
    let dest = job.dest.clone();
    let fixer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(60));
        assert!(!dest.exists());
        fs::remove_dir(tmp).unwrap();
    });

    let stats = RelocationStats::default();
    assert!(relocate_until_done(
        &job,
        Duration::from_millis(10),
        &ShutdownSignal::new(),
        &stats,
    ));
    fixer.join().unwrap();
    stop.store(true, Ordering::Release);
    watcher.join().unwrap();

    assert!(stats.snapshot().failed_attempts >= 2);
    assert_eq!(fs::read(&job.dest).unwrap(), bytes);
    assert!(!job.source.exists());
    assert_eq!(disks.names_in(layout.final_dir()), vec!["active-20.mfd"]);
}

#[test]
fn pool_relocates_segments_from_many_disks() {
    let disks = TestDisks::new();
    let config = disks.config(&["data1", "data2", "data3"]);
    let pool = RelocationPool::new(&config.relocation).unwrap();

    let mut expected = Vec::new();
    for disk in ["data1", "data2", "data3"] {
        let layout = disks.layout(&config, disk);
        fs::create_dir_all(layout.staging_dir()).unwrap();
        fs::create_dir_all(layout.final_dir()).unwrap();
        for i in 1..=4u64 {
            let name = layout.finalized_name(i);
            let mut bytes = Vec::new();
            encode_record(RecordKind::DeleteEntry, 1, name.as_bytes(), &mut bytes).unwrap();
            fs::write(layout.staging_path(&name), &bytes).unwrap();
            assert!(pool.submit(RelocationJob::new(&layout, &name)));
            expected.push((layout.final_path(&name), bytes));
        }
    }

    assert!(pool.wait_idle(Duration::from_secs(10)));
    for (path, bytes) in &expected {
        assert_eq!(&fs::read(path).unwrap(), bytes);
    }
    assert_eq!(pool.stats().snapshot().completed, 12);
    for disk in ["data1", "data2", "data3"] {
        let layout = disks.layout(&config, disk);
        assert!(layout.list_finalized().unwrap().is_empty());
    }

    pool.shutdown();
    assert!(!pool.submit(RelocationJob::new(
        &disks.layout(&config, "data1"),
        "active-99.mfd"
    )));
}

#[test]
fn shutdown_leaves_unfinished_segment_in_staging() {
    let disks = TestDisks::new();
    let (layout, job, bytes) = staged_segment(&disks, "active-30.mfd", 10);

    // The final dir never appears, so the attempt keeps failing.
    fs::create_dir_all(layout.final_dir().parent().unwrap()).unwrap();
    fs::write(layout.final_dir(), b"not a directory").unwrap();

    let config = disks.config(&["data1"]);
    let pool = RelocationPool::new(&config.relocation).unwrap();
    assert!(pool.submit(job.clone()));
    assert!(wait_until(Duration::from_secs(5), || {
        pool.stats().snapshot().failed_attempts >= 1
    }));

    pool.shutdown();
    let stats = pool.stats().snapshot();
    assert_eq!(stats.completed, 0);
    assert_eq!(stats.abandoned, 1);
    assert_eq!(fs::read(&job.source).unwrap(), bytes);
}
