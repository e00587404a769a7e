//! Group commit tests
//!
//! Verifies:
//! - Concurrent writers get disjoint, gap-free sequence ranges
//! - Followers queued behind a busy leader are merged into its group
//! - Every member of a group shares the group's log failure
//! - Followers that do not fit the group lead the next one
//! - Large leaders drain followers up to the fixed group ceiling
//! - A decoded batch with a stale sequence number can lead a group
//! - A durable leader commits alone

mod common;

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;
use tempfile::TempDir;

use tidekv::memtable::MemTableEntry;
use tidekv::wal::{self, WalReader};
use tidekv::{Batch, Engine, Result, WriteOptions};

use common::{
    config, lookup, memtable_sequences, open_engine, setup_temp_engine, stored, FlakyLogStore,
    TestCompaction,
};

// =============================================================================
// Helpers
// =============================================================================

fn spawn_put(
    engine: &Arc<Engine>,
    key: &str,
    value: Vec<u8>,
    options: WriteOptions,
) -> JoinHandle<Result<()>> {
    let engine = Arc::clone(engine);
    let key = key.to_string();
    thread::spawn(move || engine.put(key.as_bytes(), &value, &options))
}

/// An engine whose next leader parks in the gate until `release` fires
///
/// Level-0 sits at the stop trigger and the memtable is already full, so
/// the next writer to take the token blocks on compaction while later
/// writers queue up behind it.
fn blocked_engine(
    temp_dir: &TempDir,
    store: Option<Arc<FlakyLogStore>>,
) -> (Arc<Engine>, Sender<()>, Arc<TestCompaction>) {
    let (compaction, release) = TestCompaction::stalled(12);
    let mut builder = Engine::builder(config(temp_dir.path()).write_buffer_size(64).build())
        .compaction(Arc::clone(&compaction));
    if let Some(store) = store {
        builder = builder.log_store(store);
    }
    common::init_tracing();
    let engine = builder.open().unwrap();
    engine.put(b"fill", &[b'x'; 100], &WriteOptions::default()).unwrap();
    (Arc::new(engine), release, compaction)
}

/// Leader first, then the followers once it is parked
fn queue_writers(
    engine: &Arc<Engine>,
    leader: (&str, Vec<u8>, WriteOptions),
    followers: &[(&str, Vec<u8>)],
) -> (JoinHandle<Result<()>>, Vec<JoinHandle<Result<()>>>) {
    let leader = spawn_put(engine, leader.0, leader.1, leader.2);
    thread::sleep(Duration::from_millis(150));
    let followers = followers
        .iter()
        .map(|(key, value)| spawn_put(engine, key, value.clone(), WriteOptions::default()))
        .collect();
    thread::sleep(Duration::from_millis(200));
    (leader, followers)
}

/// Record count of every frame in the current log, keyed by first record key
fn logged_groups(engine: &Engine) -> HashMap<Vec<u8>, usize> {
    let path = wal::log_path(engine.data_dir(), engine.log_number());
    WalReader::open(&path)
        .unwrap()
        .map(|payload| {
            let batch = Batch::decode(&payload.unwrap()).unwrap();
            (batch.records()[0].key().to_vec(), batch.len())
        })
        .collect()
}

// =============================================================================
// Ordering
// =============================================================================

#[test]
fn test_concurrent_writers_partition_sequences() {
    const THREADS: usize = 8;
    const WRITES: usize = 100;

    let (_temp_dir, engine, _) = setup_temp_engine();
    let engine = Arc::new(engine);

    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                for i in 0..WRITES {
                    let mut batch = Batch::new();
                    for r in 0..=(t % 3) {
                        batch.put(format!("t{}-w{}-r{}", t, i, r).as_bytes(), b"v");
                    }
                    engine.write(batch, &WriteOptions::default()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let total: usize = (0..THREADS).map(|t| WRITES * (t % 3 + 1)).sum();
    assert_eq!(engine.last_sequence(), total as u64);

    let found = memtable_sequences(&engine);
    let mut seqs: Vec<u64> = found.iter().map(|(_, seq)| *seq).collect();
    seqs.sort_unstable();
    assert_eq!(seqs, (1..=total as u64).collect::<Vec<_>>());

    // Records of one batch sit at consecutive sequence numbers
    let by_key: HashMap<Vec<u8>, u64> = found.into_iter().collect();
    for t in 0..THREADS {
        for i in 0..WRITES {
            let base = by_key[format!("t{}-w{}-r0", t, i).as_bytes()];
            for r in 1..=(t % 3) {
                let seq = by_key[format!("t{}-w{}-r{}", t, i, r).as_bytes()];
                assert_eq!(seq, base + r as u64);
            }
        }
    }

    // Every write either led a group or was merged into one
    let stats = engine.stats();
    assert_eq!(
        stats.group_commits + stats.merged_writes,
        (THREADS * WRITES) as u64
    );
}

// =============================================================================
// Merging
// =============================================================================

#[test]
fn test_queued_followers_join_leader_group() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, release, _) = blocked_engine(&temp_dir, None);

    let (leader, followers) = queue_writers(
        &engine,
        ("leader", b"l".to_vec(), WriteOptions::default()),
        &[("f1", b"1".to_vec()), ("f2", b"2".to_vec()), ("f3", b"3".to_vec())],
    );
    assert_eq!(engine.last_sequence(), 1);

    release.send(()).unwrap();
    leader.join().unwrap().unwrap();
    for follower in followers {
        follower.join().unwrap().unwrap();
    }

    assert_eq!(engine.last_sequence(), 5);
    let stats = engine.stats();
    assert_eq!(stats.merged_writes, 3);
    assert_eq!(stats.group_commits, 2);

    // The leader's record comes first in the group
    let (active, _) = engine.memtables();
    assert_eq!(active.get(b"leader", 2), Some(MemTableEntry::Value(b"l".to_vec())));
    let mut follower_seqs: Vec<u64> = memtable_sequences(&engine)
        .into_iter()
        .filter(|(key, _)| key.starts_with(b"f") && key.len() == 2)
        .map(|(_, seq)| seq)
        .collect();
    follower_seqs.sort_unstable();
    assert_eq!(follower_seqs, vec![3, 4, 5]);

    // One frame for the whole group
    assert_eq!(logged_groups(&engine)[&b"leader"[..]], 4);
}

#[test]
fn test_group_shares_log_failure() {
    let temp_dir = TempDir::new().unwrap();
    let store = FlakyLogStore::new();
    let (engine, release, _) = blocked_engine(&temp_dir, Some(Arc::clone(&store)));

    let (leader, followers) = queue_writers(
        &engine,
        ("leader", b"l".to_vec(), WriteOptions::default()),
        &[("f1", b"1".to_vec()), ("f2", b"2".to_vec()), ("f3", b"3".to_vec())],
    );

    store.set_failing(true);
    release.send(()).unwrap();

    let leader_err = leader.join().unwrap().unwrap_err();
    for follower in followers {
        let err = follower.join().unwrap().unwrap_err();
        assert_eq!(err.to_string(), leader_err.to_string());
    }

    // Nothing was committed, so nothing counts as merged
    assert_eq!(engine.last_sequence(), 1);
    let stats = engine.stats();
    assert_eq!(stats.merged_writes, 0);
    assert_eq!(stats.group_commits, 1);
    for key in ["leader", "f1", "f2", "f3"] {
        assert!(lookup(&engine, key.as_bytes()).is_none());
    }

    store.set_failing(false);
    engine.put(b"after", b"v", &WriteOptions::default()).unwrap();
    assert_eq!(engine.last_sequence(), 2);
}

// =============================================================================
// Promotion
// =============================================================================

#[test]
fn test_oversized_follower_leads_next_group() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, release, compaction) = blocked_engine(&temp_dir, None);

    // Either big follower fits next to the leader, but not both
    let big = vec![b'b'; 100 * 1024];
    let (leader, followers) = queue_writers(
        &engine,
        ("leader", b"l".to_vec(), WriteOptions::default()),
        &[("big1", big.clone()), ("big2", big.clone())],
    );

    release.send(()).unwrap();
    leader.join().unwrap().unwrap();
    for follower in followers {
        follower.join().unwrap().unwrap();
    }

    assert_eq!(engine.last_sequence(), 4);
    let stats = engine.stats();
    assert_eq!(stats.merged_writes, 1);
    assert_eq!(stats.promoted_writes, 1);
    assert_eq!(stats.group_commits, 3);

    assert_eq!(
        stored(&engine, &compaction, b"big1"),
        Some(MemTableEntry::Value(big.clone()))
    );
    assert_eq!(stored(&engine, &compaction, b"big2"), Some(MemTableEntry::Value(big)));
}

#[test]
fn test_large_leader_drains_up_to_group_ceiling() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, release, compaction) = blocked_engine(&temp_dir, None);

    // A 200 KiB leader may grow to 1 MiB: two 300 KiB followers fit, the
    // third leads its own group
    let big = vec![b'b'; 300 * 1024];
    let (leader, followers) = queue_writers(
        &engine,
        ("leader", vec![b'l'; 200 * 1024], WriteOptions::default()),
        &[("big1", big.clone()), ("big2", big.clone()), ("big3", big.clone())],
    );

    release.send(()).unwrap();
    leader.join().unwrap().unwrap();
    for follower in followers {
        follower.join().unwrap().unwrap();
    }

    assert_eq!(engine.last_sequence(), 5);
    let stats = engine.stats();
    assert_eq!(stats.merged_writes, 2);
    assert_eq!(stats.promoted_writes, 1);
    assert_eq!(stats.group_commits, 3);
    assert_eq!(stats.async_log_writes, 2);

    assert_eq!(
        stored(&engine, &compaction, b"leader"),
        Some(MemTableEntry::Value(vec![b'l'; 200 * 1024]))
    );
    for key in ["big1", "big2", "big3"] {
        assert_eq!(
            stored(&engine, &compaction, key.as_bytes()),
            Some(MemTableEntry::Value(big.clone()))
        );
    }
}

// =============================================================================
// Reused Batches
// =============================================================================

#[test]
fn test_decoded_batch_leads_group() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, release, _) = blocked_engine(&temp_dir, None);

    let mut logged = Batch::new();
    logged.put(b"leader", b"l");
    logged.set_seq(42);
    let decoded = Batch::decode(&logged.encode().unwrap()).unwrap();
    assert_eq!(decoded.seq(), 42);

    let leader = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.write(decoded, &WriteOptions::default()))
    };
    thread::sleep(Duration::from_millis(150));
    let follower = spawn_put(&engine, "f1", b"1".to_vec(), WriteOptions::default());
    thread::sleep(Duration::from_millis(200));

    release.send(()).unwrap();
    leader.join().unwrap().unwrap();
    follower.join().unwrap().unwrap();

    assert_eq!(engine.last_sequence(), 3);
    assert_eq!(engine.stats().merged_writes, 1);
    let (active, _) = engine.memtables();
    assert_eq!(active.get(b"leader", 2), Some(MemTableEntry::Value(b"l".to_vec())));
    assert_eq!(active.get(b"f1", 3), Some(MemTableEntry::Value(b"1".to_vec())));
    assert_eq!(logged_groups(&engine)[&b"leader"[..]], 2);
}

// =============================================================================
// Durability
// =============================================================================

#[test]
fn test_durable_leader_commits_alone() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, release, _) = blocked_engine(&temp_dir, None);

    let (leader, followers) = queue_writers(
        &engine,
        ("leader", b"l".to_vec(), WriteOptions::sync()),
        &[("f1", b"1".to_vec()), ("f2", b"2".to_vec())],
    );

    release.send(()).unwrap();
    leader.join().unwrap().unwrap();
    for follower in followers {
        follower.join().unwrap().unwrap();
    }

    assert_eq!(engine.last_sequence(), 4);
    let groups = logged_groups(&engine);
    assert_eq!(groups[&b"leader"[..]], 1);
    assert!(engine.stats().group_commits >= 3);
}

#[test]
fn test_reopen_after_group_commit() {
    let temp_dir = TempDir::new().unwrap();
    {
        let (engine, release, _) = blocked_engine(&temp_dir, None);
        let (leader, followers) = queue_writers(
            &engine,
            ("leader", b"l".to_vec(), WriteOptions::default()),
            &[("f1", b"1".to_vec()), ("f2", b"2".to_vec())],
        );
        release.send(()).unwrap();
        leader.join().unwrap().unwrap();
        for follower in followers {
            follower.join().unwrap().unwrap();
        }
    }

    // The filled memtable was flushed to the (in-memory) table layer; the
    // group survives in the newer log
    let engine = open_engine(config(temp_dir.path()).build(), TestCompaction::new());
    assert_eq!(engine.last_sequence(), 4);
    for key in ["leader", "f1", "f2"] {
        assert!(lookup(&engine, key.as_bytes()).is_some());
    }
}
