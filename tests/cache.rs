//! LRU map tests

use hoard::cache::{EvictedEntry, LruCache, ENTRY_OVERHEAD};

fn entry_bytes(key: &str, value: &str) -> usize {
  key.len() + value.len() + ENTRY_OVERHEAD
}

// Limit that holds exactly two single-byte-key, single-byte-value entries.
fn two_entry_limit() -> usize {
  2 * entry_bytes("a", "1") + 4
}

#[test]
fn set_get_del_roundtrip() {
  let mut cache = LruCache::new(1024 * 1024);

  assert!(cache.insert("apple", "red").unwrap().is_empty());
  assert_eq!(cache.get("apple"), Some("red".to_string()));
  assert_eq!(cache.get("missing"), None);

  assert!(cache.remove("apple"));
  assert!(!cache.remove("apple"));
  assert_eq!(cache.get("apple"), None);
}

#[test]
fn byte_accounting_is_exact() {
  let mut cache = LruCache::new(1024 * 1024);
  assert_eq!(cache.memory_usage(), 0);

  cache.insert("apple", "red").unwrap();
  cache.insert("pear", "green").unwrap();
  assert_eq!(
    cache.memory_usage(),
    entry_bytes("apple", "red") + entry_bytes("pear", "green")
  );

  // Replacing swaps the old value's bytes for the new value's.
  cache.insert("apple", "granny-smith").unwrap();
  assert_eq!(
    cache.memory_usage(),
    entry_bytes("apple", "granny-smith") + entry_bytes("pear", "green")
  );
  assert_eq!(cache.len(), 2);

  // Deleting returns usage to what it was before the insert.
  cache.remove("apple");
  assert_eq!(cache.memory_usage(), entry_bytes("pear", "green"));
  cache.remove("pear");
  assert_eq!(cache.memory_usage(), 0);
}

#[test]
fn usage_never_exceeds_limit() {
  let limit = 10 * entry_bytes("key00", "value00");
  let mut cache = LruCache::new(limit);

  for i in 0..100 {
    cache
      .insert(&format!("key{:02}", i), &format!("value{:02}", i))
      .unwrap();
    assert!(cache.memory_usage() <= limit);
  }
  assert_eq!(cache.len(), 10);
}

#[test]
fn eviction_follows_recency_order() {
  let mut cache = LruCache::new(two_entry_limit());

  cache.insert("a", "1").unwrap();
  cache.insert("b", "2").unwrap();

  // Touching `a` leaves `b` as the eviction victim.
  cache.get("a");
  assert_eq!(cache.lru_key(), Some("b"));

  let evicted = cache.insert("c", "3").unwrap();
  assert_eq!(
    evicted,
    vec![EvictedEntry {
      key: "b".to_string(),
      value: "2".to_string(),
    }]
  );

  assert_eq!(cache.get("b"), None);
  assert_eq!(cache.get("a"), Some("1".to_string()));
  assert_eq!(cache.get("c"), Some("3".to_string()));
}

#[test]
fn get_promotes_to_mru() {
  let mut cache = LruCache::new(1024 * 1024);
  cache.insert("a", "1").unwrap();
  cache.insert("b", "2").unwrap();
  cache.insert("c", "3").unwrap();
  assert_eq!(cache.mru_key(), Some("c"));
  assert_eq!(cache.lru_key(), Some("a"));

  cache.get("a");
  assert_eq!(cache.mru_key(), Some("a"));
  assert_eq!(cache.lru_key(), Some("b"));
  assert_eq!(cache.keys_by_recency(), vec!["a", "c", "b"]);
}

#[test]
fn oversized_entry_is_rejected_without_side_effects() {
  let mut cache = LruCache::new(two_entry_limit());
  cache.insert("a", "1").unwrap();
  cache.insert("b", "2").unwrap();
  let usage_before = cache.memory_usage();

  let huge = "x".repeat(two_entry_limit());
  let err = cache.insert("big", &huge).unwrap_err();
  assert_eq!(err.limit, two_entry_limit());

  // Nothing was evicted and nothing was stored.
  assert_eq!(cache.memory_usage(), usage_before);
  assert_eq!(cache.get("a"), Some("1".to_string()));
  assert_eq!(cache.get("b"), Some("2".to_string()));
  assert_eq!(cache.get("big"), None);
}

#[test]
fn oversized_replacement_keeps_old_entry() {
  let mut cache = LruCache::new(two_entry_limit());
  cache.insert("a", "1").unwrap();

  let huge = "x".repeat(two_entry_limit());
  assert!(cache.insert("a", &huge).is_err());
  assert_eq!(cache.get("a"), Some("1".to_string()));
}

#[test]
fn replacement_can_trigger_eviction() {
  let mut cache = LruCache::new(two_entry_limit());
  cache.insert("a", "1").unwrap();
  cache.insert("b", "2").unwrap();

  // Growing `a` beyond its old size forces `b` out.
  let grown = "y".repeat(8);
  assert!(entry_bytes("a", &grown) + entry_bytes("b", "2") > two_entry_limit());
  let evicted = cache.insert("a", &grown).unwrap();
  assert_eq!(evicted.len(), 1);
  assert_eq!(evicted[0].key, "b");
  assert_eq!(cache.get("a"), Some(grown));
}

#[test]
fn slot_reuse_after_churn() {
  let limit = 3 * entry_bytes("k0", "v0");
  let mut cache = LruCache::new(limit);

  for round in 0..50 {
    for i in 0..3 {
      cache
        .insert(&format!("k{}", (round + i) % 7), &format!("v{}", i))
        .unwrap();
    }
    assert!(cache.len() <= 3);
    assert!(cache.memory_usage() <= limit);
  }
}
