//! In-memory [`Store`] double used by the operation-handler tests in
//! [`crate::ops`]. Exercises the exact command sequencing the handlers
//! issue without requiring a live backing store.

use std::collections::{HashMap, HashSet};

use crate::store::{Op, Store};

#[derive(Default)]
pub struct FakeStore {
    strings: HashMap<String, Vec<u8>>,
    sets: HashMap<String, HashSet<String>>,
    counters: HashMap<String, i64>,
}

impl FakeStore {
    pub fn new() -> FakeStore {
        FakeStore::default()
    }

    /// Counts every key (string, set, or counter) whose name starts with
    /// `prefix` — used by tests to check that deletion leaves nothing
    /// behind but the global inode counter (spec.md §8.6).
    pub fn key_count_with_prefix(&self, prefix: &str) -> usize {
        self.strings.keys().filter(|k| k.starts_with(prefix)).count()
            + self.sets.keys().filter(|k| k.starts_with(prefix)).count()
            + self.counters.keys().filter(|k| k.starts_with(prefix)).count()
    }
}

impl Store for FakeStore {
    fn ensure_alive(&mut self) {}

    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.strings.get(key).cloned()
    }

    fn mget(&mut self, keys: &[String]) -> Vec<Option<Vec<u8>>> {
        keys.iter().map(|k| self.strings.get(k).cloned()).collect()
    }

    fn smembers(&mut self, key: &str) -> Vec<String> {
        self.sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn incr(&mut self, key: &str) -> Option<i64> {
        let counter = self.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Some(*counter)
    }

    fn getrange(&mut self, key: &str, start: i64, end: i64) -> Option<Vec<u8>> {
        let value = self.strings.get(key)?;
        if value.is_empty() {
            return Some(Vec::new());
        }
        let len = value.len() as i64;
        let clamp = |i: i64| -> usize {
            let i = if i < 0 { (len + i).max(0) } else { i };
            i.min(len) as usize
        };
        let start = clamp(start);
        let end = clamp(end + 1);
        Some(value[start.min(end)..end].to_vec())
    }

    fn exec_batch(&mut self, ops: Vec<Op>) -> bool {
        for op in ops {
            match op {
                Op::Sadd(key, member) => {
                    self.sets.entry(key).or_default().insert(member);
                }
                Op::Srem(key, member) => {
                    if let Some(set) = self.sets.get_mut(&key) {
                        set.remove(&member);
                        if set.is_empty() {
                            self.sets.remove(&key);
                        }
                    }
                }
                Op::Mset(pairs) => {
                    for (k, v) in pairs {
                        self.strings.insert(k, v);
                    }
                }
                Op::Append(key, value) => {
                    self.strings.entry(key).or_default().extend_from_slice(&value);
                }
                Op::IncrBy(key, delta) => {
                    let current = self
                        .strings
                        .get(&key)
                        .and_then(|v| std::str::from_utf8(v).ok())
                        .and_then(|s| s.parse::<i64>().ok())
                        .unwrap_or(0);
                    self.strings
                        .insert(key, (current + delta).to_string().into_bytes());
                }
                Op::Del(keys) => {
                    for k in keys {
                        self.strings.remove(&k);
                        self.sets.remove(&k);
                        self.counters.remove(&k);
                    }
                }
            }
        }
        true
    }
}
