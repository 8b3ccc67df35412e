//! Inode allocator (spec.md §4.4): a single atomically-incremented counter
//! key, monotone and never reused even after deletion.

use crate::codec;
use crate::store::Store;

/// Sentinel returned when the counter reply could not be read as an
/// integer; callers must abort the operation with `-EIO`.
pub const ALLOC_FAILED: i64 = -1;

pub fn next_inode(store: &mut dyn Store, prefix: &str) -> i64 {
    store
        .incr(&codec::counter_key(prefix))
        .unwrap_or(ALLOC_FAILED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_store::FakeStore;

    #[test]
    fn allocates_strictly_increasing_numbers() {
        let mut store = FakeStore::new();
        let a = next_inode(&mut store, "skx");
        let b = next_inode(&mut store, "skx");
        assert!(b > a);
    }
}
