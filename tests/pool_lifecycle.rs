//! End-to-end scenarios from spec §8, exercised against the public engine API.

use kydras_storage::disk::DeviceClass;
use kydras_storage::pool::PoolKind;
use kydras_storage::rules::PoolRule;
use kydras_storage::{EngineConfig, StorageEngine};
use std::io::Cursor;
use tempfile::tempdir;

fn engine_in(dir: &std::path::Path) -> StorageEngine {
    StorageEngine::with_db_path(EngineConfig::testing(), dir.join("idx.db")).unwrap()
}

/// Scenario 1: two healthy SSD drives, a plain write lands identical bytes on both.
#[test]
fn scenario_1_default_duplication_writes_every_drive() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();
    engine.add_drive(pool_id, dir.path().join("d2"), "d2", DeviceClass::Ssd).unwrap();

    let mut rule = PoolRule::new("**");
    rule = rule.with_duplication(2);
    engine.add_rule(pool_id, rule).unwrap();

    let mut cursor = Cursor::new(b"hello".to_vec());
    engine.write(pool_id, "docs/a.txt", &mut cursor).unwrap();

    let pool = engine.get_pool(pool_id).unwrap();
    let mut found = 0;
    for drive in &pool.drives {
        let path = drive.root.join("docs").join("a.txt");
        if path.is_file() {
            assert_eq!(std::fs::read(&path).unwrap(), b"hello");
            found += 1;
        }
    }
    assert_eq!(found, 2);
}

/// Scenario 2: a rule with duplication 1 and prefer_ssd places on exactly one drive.
#[test]
fn scenario_2_single_replica_prefers_higher_scoring_drive() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();
    engine.add_drive(pool_id, dir.path().join("d2"), "d2", DeviceClass::Ssd).unwrap();
    engine
        .add_rule(pool_id, PoolRule::new("*.mp4").with_duplication(1).with_prefer_ssd(true))
        .unwrap();

    let payload = vec![7u8; 10 * 1024 * 1024];
    let mut cursor = Cursor::new(payload);
    engine.write(pool_id, "film.mp4", &mut cursor).unwrap();

    let pool = engine.get_pool(pool_id).unwrap();
    let present: Vec<_> = pool.drives.iter().filter(|d| d.root.join("film.mp4").is_file()).collect();
    assert_eq!(present.len(), 1);
}

/// Scenario 3: an out-of-band deleted replica is recreated by a subsequent read.
#[test]
fn scenario_3_read_heals_deleted_replica() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();
    engine.add_drive(pool_id, dir.path().join("d2"), "d2", DeviceClass::Ssd).unwrap();
    engine.add_rule(pool_id, PoolRule::new("**").with_duplication(2)).unwrap();

    let mut cursor = Cursor::new(b"hello".to_vec());
    engine.write(pool_id, "docs/a.txt", &mut cursor).unwrap();

    let pool = engine.get_pool(pool_id).unwrap();
    let victim = pool.drives[1].root.join("docs").join("a.txt");
    std::fs::remove_file(&victim).unwrap();

    let data = engine.read(pool_id, "docs/a.txt").unwrap();
    assert_eq!(data, b"hello");
    assert!(victim.is_file());
    assert_eq!(std::fs::read(&victim).unwrap(), b"hello");
}

/// Scenario 4: an out-of-band tampered replica is overwritten back to the
/// index's recorded hash by a subsequent read.
#[test]
fn scenario_4_read_heals_diverged_replica() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();
    engine.add_drive(pool_id, dir.path().join("d2"), "d2", DeviceClass::Ssd).unwrap();
    engine.add_rule(pool_id, PoolRule::new("**").with_duplication(2)).unwrap();

    let mut cursor = Cursor::new(b"hello".to_vec());
    engine.write(pool_id, "docs/a.txt", &mut cursor).unwrap();

    let pool = engine.get_pool(pool_id).unwrap();
    let tampered = pool.drives[1].root.join("docs").join("a.txt");
    std::fs::write(&tampered, b"HELLO").unwrap();

    let data = engine.read(pool_id, "docs/a.txt").unwrap();
    assert_eq!(data, b"hello");
    assert_eq!(std::fs::read(&tampered).unwrap(), b"hello");
}

/// Scenario 5: three drives hold a duplication-2 file; rebalance evicts the
/// lowest-ranked holder and leaves the other two intact and identical.
#[test]
fn scenario_5_rebalance_evicts_lowest_ranked_holder() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();
    engine.add_drive(pool_id, dir.path().join("d2"), "d2", DeviceClass::Ssd).unwrap();
    engine.add_drive(pool_id, dir.path().join("d3"), "d3", DeviceClass::Hdd).unwrap();
    engine.add_rule(pool_id, PoolRule::new("**").with_duplication(2)).unwrap();

    let mut cursor = Cursor::new(b"content".to_vec());
    engine.write(pool_id, "a.bin", &mut cursor).unwrap();

    // Simulate a third, untracked replica landing on the drive the write
    // didn't pick, so the pool now holds 3 copies against a duplication-2 rule.
    let pool = engine.get_pool(pool_id).unwrap();
    let holder_roots: std::collections::HashSet<_> = pool
        .drives
        .iter()
        .filter(|d| d.root.join("a.bin").is_file())
        .map(|d| d.root.clone())
        .collect();
    let third = pool.drives.iter().find(|d| !holder_roots.contains(&d.root)).unwrap();
    std::fs::write(third.root.join("a.bin"), b"content").unwrap();

    let report = engine.rebalance(pool_id).unwrap();
    assert_eq!(report.replicas_evicted, 1);

    let pool = engine.get_pool(pool_id).unwrap();
    let holders: Vec<_> = pool.drives.iter().filter(|d| d.root.join("a.bin").is_file()).collect();
    assert_eq!(holders.len(), 2);
    let contents: Vec<_> = holders.iter().map(|d| std::fs::read(d.root.join("a.bin")).unwrap()).collect();
    assert_eq!(contents[0], contents[1]);
}

/// Scenario 6: duplication level exceeds eligible drives; write fails and
/// leaves no staged temporaries on either drive.
#[test]
fn scenario_6_insufficient_replicas_leaves_no_temp_files() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();
    engine.add_drive(pool_id, dir.path().join("d2"), "d2", DeviceClass::Ssd).unwrap();
    engine.add_rule(pool_id, PoolRule::new("**").with_duplication(3)).unwrap();

    let mut cursor = Cursor::new(b"x".to_vec());
    let result = engine.write(pool_id, "a.bin", &mut cursor);
    assert!(result.is_err());

    for name in ["d1", "d2"] {
        let entries: Vec<_> = std::fs::read_dir(dir.path().join(name))
            .unwrap()
            .filter_map(|e| e.ok())
            .collect();
        assert!(entries.is_empty(), "drive {name} should have no staged temp files");
    }
}

/// P1/I1: path sanitization rejects `..` traversal through the public API too.
#[test]
fn path_traversal_is_rejected_through_public_write() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();

    let mut cursor = Cursor::new(b"x".to_vec());
    let result = engine.write(pool_id, "../escape.txt", &mut cursor);
    assert!(result.is_err());
}

/// `remove_drive` does not delete files already placed on that drive.
#[test]
fn remove_drive_preserves_existing_files() {
    let dir = tempdir().unwrap();
    let engine = engine_in(dir.path());
    let pool_id = engine.create_pool("media", &[dir.path().join("d1")], PoolKind::Jbod).unwrap();

    let mut cursor = Cursor::new(b"keepme".to_vec());
    engine.write(pool_id, "a.txt", &mut cursor).unwrap();

    engine.remove_drive(pool_id, "drive-0").unwrap();

    assert_eq!(std::fs::read(dir.path().join("d1").join("a.txt")).unwrap(), b"keepme");
}
