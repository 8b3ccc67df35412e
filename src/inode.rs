//! Inode metadata layer (spec.md §3.1, §4.6 metadata reads/writes).
//!
//! Each attribute of an inode is an independent store key (spec.md §4.3);
//! this module batches the eleven of them into one multi-get on read and
//! one `MSET` on write, and never conflates "attribute absent" with "inode
//! absent" except via the NAME/TYPE pair, which invariant §3.2(3) ties
//! together ("type is set exactly when any other attribute is set").

use crate::codec::{self, Attr};
use crate::store::{Op, Store};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Link,
}

impl FileKind {
    fn as_str(self) -> &'static str {
        match self {
            FileKind::File => "FILE",
            FileKind::Dir => "DIR",
            FileKind::Link => "LINK",
        }
    }

    pub fn parse(bytes: &[u8]) -> Option<FileKind> {
        match bytes {
            b"FILE" => Some(FileKind::File),
            b"DIR" => Some(FileKind::Dir),
            b"LINK" => Some(FileKind::Link),
            _ => None,
        }
    }
}

/// The full attribute block of one non-root inode (spec.md §3.1 table).
#[derive(Debug, Clone)]
pub struct InodeAttributes {
    pub name: Vec<u8>,
    pub kind: FileKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub ctime: i64,
    pub mtime: i64,
    pub link: u32,
    pub target: Vec<u8>,
}

fn parse_int(bytes: Option<Vec<u8>>) -> Option<i64> {
    std::str::from_utf8(&bytes?).ok()?.parse().ok()
}

/// Fetches every attribute of `inode` in a single batched multi-get.
/// Returns `None` if the inode has no NAME or TYPE key (i.e. does not
/// exist). A malformed or missing numeric attribute is treated as zero
/// rather than failing the whole read (spec.md §7(f)).
pub fn read_attrs(store: &mut dyn Store, prefix: &str, inode: i64) -> Option<InodeAttributes> {
    let keys: Vec<String> = Attr::ALL
        .iter()
        .map(|a| codec::inode_key(prefix, inode, *a))
        .collect();
    let mut replies = store.mget(&keys).into_iter();
    let mut next = || replies.next().flatten();

    let name = next()?;
    if name.is_empty() {
        return None;
    }
    let kind = FileKind::parse(&next()?)?;
    let mode = parse_int(next()).unwrap_or(0) as u32;
    let uid = parse_int(next()).unwrap_or(0) as u32;
    let gid = parse_int(next()).unwrap_or(0) as u32;
    let size = parse_int(next()).unwrap_or(0).max(0) as u64;
    let atime = parse_int(next()).unwrap_or(0);
    let ctime = parse_int(next()).unwrap_or(0);
    let mtime = parse_int(next()).unwrap_or(0);
    let link = parse_int(next()).unwrap_or(1).max(0) as u32;
    let target = next().unwrap_or_default();
    let _data_slot = next(); // DATA is read separately via getrange, not here.

    Some(InodeAttributes {
        name,
        kind,
        mode,
        uid,
        gid,
        size,
        atime,
        ctime,
        mtime,
        link,
        target,
    })
}

/// Builds the `MSET` op that writes every non-DATA attribute of a freshly
/// allocated inode (spec.md §3.3 "born"). `data` is handled separately
/// since DATA is written by `write`, not at creation time.
#[allow(clippy::too_many_arguments)]
pub fn create_attrs_op(
    prefix: &str,
    inode: i64,
    name: &[u8],
    kind: FileKind,
    mode: u32,
    uid: u32,
    gid: u32,
    size: u64,
    now: i64,
    target: &[u8],
) -> Op {
    let mut pairs = vec![
        (codec::inode_key(prefix, inode, Attr::Name), name.to_vec()),
        (
            codec::inode_key(prefix, inode, Attr::Type),
            kind.as_str().as_bytes().to_vec(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Mode),
            mode.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Uid),
            uid.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Gid),
            gid.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Size),
            size.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Ctime),
            now.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Mtime),
            now.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Atime),
            now.to_string().into_bytes(),
        ),
        (
            codec::inode_key(prefix, inode, Attr::Link),
            1u32.to_string().into_bytes(),
        ),
    ];
    if kind == FileKind::Link {
        pairs.push((
            codec::inode_key(prefix, inode, Attr::Target),
            target.to_vec(),
        ));
    }
    Op::Mset(pairs)
}

/// Builds the batch of deletes that erases every attribute key of `inode`
/// (spec.md §3.3 "dies"). Unconditionally deletes all twelve attribute
/// names; deleting an absent key is a no-op on the backing store.
pub fn delete_attrs_op(prefix: &str, inode: i64) -> Op {
    Op::Del(
        Attr::ALL
            .iter()
            .map(|a| codec::inode_key(prefix, inode, *a))
            .collect(),
    )
}
