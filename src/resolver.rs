//! Path resolver (spec.md §4.5).
//!
//! The flat store has no hierarchical index, so each path component costs
//! two round trips: one `SMEMBERS` to list the parent's children, and one
//! batched `MGET` of every child's NAME to find the match. Re-resolves from
//! root on every call — nothing about path topology is cached between
//! operations.

use crate::codec::{self, Attr, ROOT_INODE};
use crate::path_utils;
use crate::store::Store;

/// Resolves an absolute path to the inode number of the named entry.
/// Returns `None` if any component along the way does not exist.
pub fn resolve(store: &mut dyn Store, prefix: &str, path: &[u8]) -> Option<i64> {
    if path == b"/" {
        return Some(ROOT_INODE);
    }

    let parent_path = path_utils::parent(path)?;
    let entry_name = path_utils::basename(path);
    let parent_inode = resolve(store, prefix, parent_path)?;

    resolve_child(store, prefix, parent_inode, entry_name)
}

/// One level of resolution: given a parent inode already known to exist,
/// finds the child named `entry_name` within it.
pub fn resolve_child(
    store: &mut dyn Store,
    prefix: &str,
    parent_inode: i64,
    entry_name: &[u8],
) -> Option<i64> {
    let members = store.smembers(&codec::dirent_key(prefix, parent_inode));
    if members.is_empty() {
        return None;
    }

    let child_inodes: Vec<i64> = members.iter().filter_map(|m| m.parse().ok()).collect();
    let name_keys: Vec<String> = child_inodes
        .iter()
        .map(|ino| codec::inode_key(prefix, *ino, Attr::Name))
        .collect();
    let names = store.mget(&name_keys);

    for (inode, name) in child_inodes.iter().zip(names.into_iter()) {
        if let Some(name) = name {
            if name == entry_name {
                return Some(*inode);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_store::FakeStore;
    use crate::inode::{create_attrs_op, FileKind};
    use crate::store::Op;

    fn mkdir(store: &mut FakeStore, prefix: &str, parent: i64, inode: i64, name: &[u8]) {
        store.exec_batch(vec![
            Op::Sadd(codec::dirent_key(prefix, parent), inode.to_string()),
            create_attrs_op(prefix, inode, name, FileKind::Dir, 0o755, 0, 0, 0, 0, b""),
        ]);
    }

    #[test]
    fn root_resolves_without_touching_store() {
        let mut store = FakeStore::new();
        assert_eq!(resolve(&mut store, "skx", b"/"), Some(ROOT_INODE));
    }

    #[test]
    fn missing_top_level_entry_is_not_found() {
        let mut store = FakeStore::new();
        assert_eq!(resolve(&mut store, "skx", b"/nope"), None);
    }

    #[test]
    fn nested_path_resolves_through_each_level() {
        let mut store = FakeStore::new();
        mkdir(&mut store, "skx", ROOT_INODE, 1, b"foo");
        mkdir(&mut store, "skx", 1, 2, b"bar");
        assert_eq!(resolve(&mut store, "skx", b"/foo"), Some(1));
        assert_eq!(resolve(&mut store, "skx", b"/foo/bar"), Some(2));
        assert_eq!(resolve(&mut store, "skx", b"/foo/nope"), None);
        assert_eq!(resolve(&mut store, "skx", b"/nope/bar"), None);
    }
}
