//! Counting membership filter

use xxhash_rust::xxh64::xxh64;

// Independent hash functions are derived from one xxh64 core by seeding.
const FILTER_SEEDS: [u64; 3] = [0x9e37_79b9_7f4a_7c15, 0xc2b2_ae3d_27d4_eb4f, 0x1656_67b1_9e37_79f9];

/// Approximate set of live log keys.
///
/// `contains` may report a false positive (costing one wasted index lookup)
/// but never a false negative for a live key: each key increments counters
/// at k independent positions, and a counter that has saturated is never
/// decremented again, so removals of colliding keys cannot drive a live
/// key's counters to zero.
pub struct CountingFilter {
  counters: Vec<u16>,
}

impl CountingFilter {
  pub fn new(buckets: usize) -> Self {
    Self {
      counters: vec![0; buckets.max(1)],
    }
  }

  pub fn insert(&mut self, key: &str) {
    for slot in self.slots(key) {
      let counter = &mut self.counters[slot];
      *counter = counter.saturating_add(1);
    }
  }

  pub fn remove(&mut self, key: &str) {
    for slot in self.slots(key) {
      let counter = &mut self.counters[slot];
      if *counter > 0 && *counter < u16::MAX {
        *counter -= 1;
      }
    }
  }

  pub fn contains(&self, key: &str) -> bool {
    self.slots(key).iter().all(|&slot| self.counters[slot] > 0)
  }

  fn slots(&self, key: &str) -> [usize; FILTER_SEEDS.len()] {
    FILTER_SEEDS.map(|seed| (xxh64(key.as_bytes(), seed) as usize) % self.counters.len())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_remove_contains() {
    let mut filter = CountingFilter::new(64);
    filter.insert("apple");
    filter.insert("pear");
    assert!(filter.contains("apple"));
    assert!(filter.contains("pear"));

    filter.remove("pear");
    assert!(filter.contains("apple"));
  }

  #[test]
  fn collisions_never_hide_live_keys() {
    // One bucket forces every key onto the same counters.
    let mut filter = CountingFilter::new(1);
    filter.insert("keeper");
    for i in 0..100 {
      filter.insert(&format!("churn{}", i));
    }
    for i in 0..100 {
      filter.remove(&format!("churn{}", i));
    }
    assert!(filter.contains("keeper"));
  }
}
