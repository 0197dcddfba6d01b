//! Append-only log tests

use hoard::persist::{CountingFilter, LogStore};

fn temp_log(dir: &tempfile::TempDir) -> LogStore {
  LogStore::open(dir.path().join("kv.log"), 1024).unwrap()
}

#[test]
fn insert_get_remove() {
  let dir = tempfile::tempdir().unwrap();
  let log = temp_log(&dir);

  log.insert("apple", "red").unwrap();
  log.insert("pear", "green").unwrap();

  assert_eq!(log.get("apple").unwrap(), Some("red".to_string()));
  assert_eq!(log.get("pear").unwrap(), Some("green".to_string()));
  assert_eq!(log.get("plum").unwrap(), None);

  assert!(log.remove("apple"));
  assert!(!log.remove("apple"));
  assert_eq!(log.get("apple").unwrap(), None);
  assert_eq!(log.live_len(), 1);
}

#[test]
fn latest_record_wins() {
  let dir = tempfile::tempdir().unwrap();
  let log = temp_log(&dir);

  log.insert("key", "v1").unwrap();
  log.insert("key", "v2").unwrap();
  log.insert("key", "v3").unwrap();

  assert_eq!(log.get("key").unwrap(), Some("v3".to_string()));
  assert_eq!(log.live_len(), 1);
}

#[test]
fn reopen_rebuilds_index_from_file() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("kv.log");

  {
    let log = LogStore::open(&path, 1024).unwrap();
    for i in 0..20 {
      log.insert(&format!("key{}", i), &format!("value{}", i)).unwrap();
    }
    log.insert("key3", "rewritten").unwrap();
  }

  let log = LogStore::open(&path, 1024).unwrap();
  assert_eq!(log.live_len(), 20);
  assert_eq!(log.get("key7").unwrap(), Some("value7".to_string()));
  assert_eq!(log.get("key3").unwrap(), Some("rewritten".to_string()));
}

#[test]
fn compaction_reclaims_dead_records() {
  let dir = tempfile::tempdir().unwrap();
  let log = temp_log(&dir);

  for i in 0..100 {
    log.insert(&format!("key{:03}", i), &format!("value{:03}", i)).unwrap();
  }
  for i in (0..100).step_by(2) {
    assert!(log.remove(&format!("key{:03}", i)));
  }
  assert!(log.dirty() > 0);

  let stats = log.compact().unwrap();
  assert_eq!(stats.kept, 50);
  assert_eq!(stats.dropped, 50);
  assert_eq!(log.dirty(), 0);

  // The live file now holds exactly the surviving records.
  let expected_bytes: u64 = (0..100)
    .skip(1)
    .step_by(2)
    .map(|i| format!("key{:03} value{:03}\n", i, i).len() as u64)
    .sum();
  let file_len = std::fs::metadata(log.path()).unwrap().len();
  assert_eq!(file_len, expected_bytes);
  assert_eq!(stats.live_bytes, expected_bytes);

  for i in 0..100 {
    let key = format!("key{:03}", i);
    if i % 2 == 0 {
      assert_eq!(log.get(&key).unwrap(), None);
    } else {
      assert_eq!(log.get(&key).unwrap(), Some(format!("value{:03}", i)));
    }
  }
}

#[test]
fn compaction_squashes_superseded_versions() {
  let dir = tempfile::tempdir().unwrap();
  let log = temp_log(&dir);

  for round in 0..10 {
    log.insert("churn", &format!("v{}", round)).unwrap();
  }
  log.insert("stable", "s").unwrap();

  let stats = log.compact().unwrap();
  assert_eq!(stats.kept, 2);
  assert_eq!(stats.dropped, 9);
  assert_eq!(log.get("churn").unwrap(), Some("v9".to_string()));
  assert_eq!(log.get("stable").unwrap(), Some("s".to_string()));
}

#[test]
fn removals_survive_compaction_and_reopen() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("kv.log");

  {
    let log = LogStore::open(&path, 1024).unwrap();
    log.insert("keep", "1").unwrap();
    log.insert("drop", "2").unwrap();
    log.remove("drop");
    log.compact().unwrap();
  }

  let log = LogStore::open(&path, 1024).unwrap();
  assert_eq!(log.get("keep").unwrap(), Some("1".to_string()));
  assert_eq!(log.get("drop").unwrap(), None);
  assert_eq!(log.live_len(), 1);
}

#[test]
fn mismatched_record_is_treated_as_miss() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("kv.log");
  let log = LogStore::open(&path, 1024).unwrap();

  log.insert("alpha", "1").unwrap();
  assert_eq!(log.get("alpha").unwrap(), Some("1".to_string()));

  // Clobber the file behind the store's back: the indexed offset now
  // points at a record for a different key.
  std::fs::write(&path, "omega 9\n").unwrap();
  assert_eq!(log.get("alpha").unwrap(), None);

  // The suspect index entry was discarded, not retried forever.
  assert_eq!(log.live_len(), 0);
}

#[test]
fn filter_has_no_false_negatives() {
  let mut filter = CountingFilter::new(32);
  for i in 0..200 {
    filter.insert(&format!("key{}", i));
  }
  for i in (0..200).step_by(3) {
    filter.remove(&format!("key{}", i));
  }
  for i in 0..200 {
    if i % 3 != 0 {
      assert!(filter.contains(&format!("key{}", i)));
    }
  }
}

#[test]
fn saturated_filter_counters_never_underflow() {
  let mut filter = CountingFilter::new(1);
  for _ in 0..70_000 {
    filter.insert("heavy");
  }
  filter.insert("live");
  for _ in 0..70_000 {
    filter.remove("heavy");
  }
  assert!(filter.contains("live"));
}
