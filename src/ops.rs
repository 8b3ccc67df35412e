//! Operation handlers (spec.md §4.6): one per filesystem callback, each
//! composing the resolver, the inode metadata layer, and directory-set
//! mutations into a single semantic step. Callers ([`crate::fs`]) hold the
//! process-wide lock across the whole call (spec.md §5).
//!
//! Every handler that mutates state refuses with `EPERM` when `read_only`
//! is set, without touching the store.

use fuser::Errno;

use crate::alloc::{self, ALLOC_FAILED};
use crate::codec::{self, Attr, ROOT_INODE};
use crate::config::Config;
use crate::inode::{self, FileKind};
use crate::path_utils;
use crate::resolver;
use crate::store::{Op, Store};

pub type FsResult<T> = Result<T, Errno>;

/// Decoded `stat`-equivalent for one inode (root or otherwise).
#[derive(Debug, Clone)]
pub struct Stat {
    pub ino: i64,
    pub kind: FileKind,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub nlink: u32,
}

fn file_type_bits(kind: FileKind) -> u32 {
    match kind {
        FileKind::Dir => libc::S_IFDIR as u32,
        FileKind::Link => libc::S_IFLNK as u32,
        FileKind::File => libc::S_IFREG as u32,
    }
}

/// getattr(path) -> stat (spec.md §4.6).
pub fn getattr(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    caller_uid: u32,
    caller_gid: u32,
    now: i64,
) -> FsResult<Stat> {
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;

    if ino == ROOT_INODE {
        return Ok(Stat {
            ino,
            kind: FileKind::Dir,
            mode: libc::S_IFDIR as u32 | 0o755,
            uid: caller_uid,
            gid: caller_gid,
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            nlink: 1,
        });
    }

    let attrs = inode::read_attrs(store, &cfg.prefix, ino).ok_or(Errno::ENOENT)?;
    let (size, nlink) = match attrs.kind {
        FileKind::Link => (0, 1),
        FileKind::Dir => (0, attrs.link),
        FileKind::File => (attrs.size, attrs.link),
    };
    let mode = (attrs.mode & !libc::S_IFMT as u32) | file_type_bits(attrs.kind);
    Ok(Stat {
        ino,
        kind: attrs.kind,
        mode,
        uid: attrs.uid,
        gid: attrs.gid,
        size,
        atime: attrs.atime,
        mtime: attrs.mtime,
        ctime: attrs.ctime,
        nlink,
    })
}

/// readdir(path) -> listing. Always yields `.` and `..` first, even when
/// the resolved target was not found (spec.md §4.6 readdir).
pub fn readdir(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
) -> FsResult<Vec<(Vec<u8>, FileKind, i64)>> {
    let Some(ino) = resolver::resolve(store, &cfg.prefix, path) else {
        return Ok(vec![
            (b".".to_vec(), FileKind::Dir, ROOT_INODE),
            (b"..".to_vec(), FileKind::Dir, ROOT_INODE),
        ]);
    };
    let parent_ino = path_utils::parent(path)
        .and_then(|p| resolver::resolve(store, &cfg.prefix, p))
        .unwrap_or(ino);

    let mut entries = vec![
        (b".".to_vec(), FileKind::Dir, ino),
        (b"..".to_vec(), FileKind::Dir, parent_ino),
    ];

    let members = store.smembers(&codec::dirent_key(&cfg.prefix, ino));
    let child_inodes: Vec<i64> = members.iter().filter_map(|m| m.parse().ok()).collect();
    let mut keys: Vec<String> = Vec::with_capacity(child_inodes.len() * 2);
    for c in &child_inodes {
        keys.push(codec::inode_key(&cfg.prefix, *c, Attr::Name));
        keys.push(codec::inode_key(&cfg.prefix, *c, Attr::Type));
    }
    let mut replies = store.mget(&keys).into_iter();
    for child in &child_inodes {
        let name = replies.next().flatten();
        let kind = replies.next().flatten();
        if let (Some(name), Some(kind)) = (name, kind) {
            if let Some(kind) = FileKind::parse(&kind) {
                entries.push((name, kind, *child));
            }
        }
    }
    Ok(entries)
}

fn split(path: &[u8]) -> FsResult<(&[u8], &[u8])> {
    let parent_path = path_utils::parent(path).ok_or(Errno::ENOENT)?;
    Ok((parent_path, path_utils::basename(path)))
}

fn resolve_parent_and_check_free(
    store: &mut dyn Store,
    prefix: &str,
    path: &[u8],
) -> FsResult<(i64, Vec<u8>)> {
    let (parent_path, entry_name) = split(path)?;
    let parent_inode = resolver::resolve(store, prefix, parent_path).ok_or(Errno::ENOENT)?;
    if resolver::resolve_child(store, prefix, parent_inode, entry_name).is_some() {
        return Err(Errno::EEXIST);
    }
    Ok((parent_inode, entry_name.to_vec()))
}

/// mkdir(path, mode) (spec.md §4.6). Rejects an existing basename with
/// `EEXIST` (SPEC_FULL open-question resolution).
pub fn mkdir(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    mode: u32,
    uid: u32,
    gid: u32,
    now: i64,
) -> FsResult<i64> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let (parent_inode, name) = resolve_parent_and_check_free(store, &cfg.prefix, path)?;
    let inode = alloc::next_inode(store, &cfg.prefix);
    if inode == ALLOC_FAILED {
        return Err(Errno::EIO);
    }
    let ok = store.exec_batch(vec![
        Op::Sadd(codec::dirent_key(&cfg.prefix, parent_inode), inode.to_string()),
        inode::create_attrs_op(&cfg.prefix, inode, &name, FileKind::Dir, mode, uid, gid, 0, now, b""),
    ]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(inode)
}

/// create(path, mode) (spec.md §4.6). Like `mkdir` but `TYPE=FILE` and no
/// child directory-entry set is created.
pub fn create(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    mode: u32,
    uid: u32,
    gid: u32,
    now: i64,
) -> FsResult<i64> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let (parent_inode, name) = resolve_parent_and_check_free(store, &cfg.prefix, path)?;
    let inode = alloc::next_inode(store, &cfg.prefix);
    if inode == ALLOC_FAILED {
        return Err(Errno::EIO);
    }
    let ok = store.exec_batch(vec![
        Op::Sadd(codec::dirent_key(&cfg.prefix, parent_inode), inode.to_string()),
        inode::create_attrs_op(&cfg.prefix, inode, &name, FileKind::File, mode, uid, gid, 0, now, b""),
    ]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(inode)
}

/// symlink(target, path) (spec.md §4.6).
pub fn symlink(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    target: &[u8],
    uid: u32,
    gid: u32,
    now: i64,
) -> FsResult<i64> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let (parent_inode, name) = resolve_parent_and_check_free(store, &cfg.prefix, path)?;
    let inode = alloc::next_inode(store, &cfg.prefix);
    if inode == ALLOC_FAILED {
        return Err(Errno::EIO);
    }
    let ok = store.exec_batch(vec![
        Op::Sadd(codec::dirent_key(&cfg.prefix, parent_inode), inode.to_string()),
        inode::create_attrs_op(
            &cfg.prefix,
            inode,
            &name,
            FileKind::Link,
            0o444,
            uid,
            gid,
            target.len() as u64,
            now,
            target,
        ),
    ]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(inode)
}

/// rmdir(path) (spec.md §4.6). Refuses non-empty directories and does not
/// recurse.
pub fn rmdir(store: &mut dyn Store, cfg: &Config, path: &[u8]) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let attrs = inode::read_attrs(store, &cfg.prefix, ino).ok_or(Errno::ENOENT)?;
    if attrs.kind != FileKind::Dir {
        return Err(Errno::ENOENT);
    }
    if !store.smembers(&codec::dirent_key(&cfg.prefix, ino)).is_empty() {
        return Err(Errno::ENOTEMPTY);
    }
    let (parent_path, _) = split(path)?;
    let parent_inode = resolver::resolve(store, &cfg.prefix, parent_path).ok_or(Errno::ENOENT)?;

    let ok = store.exec_batch(vec![
        Op::Srem(codec::dirent_key(&cfg.prefix, parent_inode), ino.to_string()),
        inode::delete_attrs_op(&cfg.prefix, ino),
    ]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(())
}

/// unlink(path) (spec.md §4.6). Does not distinguish files from symlinks;
/// both are removed the same way. Directories are routed through `rmdir`
/// by the caller.
pub fn unlink(store: &mut dyn Store, cfg: &Config, path: &[u8]) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let (parent_path, _) = split(path)?;
    let parent_inode = resolver::resolve(store, &cfg.prefix, parent_path).ok_or(Errno::ENOENT)?;

    let ok = store.exec_batch(vec![
        Op::Srem(codec::dirent_key(&cfg.prefix, parent_inode), ino.to_string()),
        inode::delete_attrs_op(&cfg.prefix, ino),
    ]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(())
}

/// readlink(path, buf) (spec.md §4.6).
pub fn readlink(store: &mut dyn Store, cfg: &Config, path: &[u8]) -> FsResult<Vec<u8>> {
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let target = store
        .get(&codec::inode_key(&cfg.prefix, ino, Attr::Target))
        .filter(|t| !t.is_empty())
        .ok_or(Errno::ENOENT)?;
    Ok(target)
}

/// chmod(path, mode).
pub fn chmod(store: &mut dyn Store, cfg: &Config, path: &[u8], mode: u32, now: i64) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let ok = store.exec_batch(vec![Op::Mset(vec![
        (
            codec::inode_key(&cfg.prefix, ino, Attr::Mode),
            mode.to_string().into_bytes(),
        ),
        (
            codec::inode_key(&cfg.prefix, ino, Attr::Mtime),
            now.to_string().into_bytes(),
        ),
    ])]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(())
}

/// chown(path, uid, gid).
pub fn chown(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    uid: Option<u32>,
    gid: Option<u32>,
    now: i64,
) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let mut pairs = Vec::new();
    if let Some(uid) = uid {
        pairs.push((
            codec::inode_key(&cfg.prefix, ino, Attr::Uid),
            uid.to_string().into_bytes(),
        ));
    }
    if let Some(gid) = gid {
        pairs.push((
            codec::inode_key(&cfg.prefix, ino, Attr::Gid),
            gid.to_string().into_bytes(),
        ));
    }
    pairs.push((
        codec::inode_key(&cfg.prefix, ino, Attr::Mtime),
        now.to_string().into_bytes(),
    ));
    if !store.exec_batch(vec![Op::Mset(pairs)]) {
        return Err(Errno::EIO);
    }
    Ok(())
}

/// utimens(path, [atime, mtime]).
pub fn utimens(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    atime: Option<i64>,
    mtime: Option<i64>,
) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let mut pairs = Vec::new();
    if let Some(atime) = atime {
        pairs.push((
            codec::inode_key(&cfg.prefix, ino, Attr::Atime),
            atime.to_string().into_bytes(),
        ));
    }
    if let Some(mtime) = mtime {
        pairs.push((
            codec::inode_key(&cfg.prefix, ino, Attr::Mtime),
            mtime.to_string().into_bytes(),
        ));
    }
    if pairs.is_empty() {
        return Ok(());
    }
    if !store.exec_batch(vec![Op::Mset(pairs)]) {
        return Err(Errno::EIO);
    }
    Ok(())
}

/// open(path) / access(path). Treated as a no-op for permission
/// enforcement (the kernel already gate-kept); a missing path still
/// returns success. In `fast` mode, skips the store entirely.
pub fn open_or_access(store: &mut dyn Store, cfg: &Config, path: &[u8], now: i64) -> FsResult<()> {
    if cfg.fast {
        return Ok(());
    }
    if let Some(ino) = resolver::resolve(store, &cfg.prefix, path) {
        if ino != ROOT_INODE {
            store.exec_batch(vec![Op::Mset(vec![(
                codec::inode_key(&cfg.prefix, ino, Attr::Atime),
                now.to_string().into_bytes(),
            )])]);
        }
    }
    Ok(())
}

/// read(path, buf, size, offset) (spec.md §4.6). Clamps the request to the
/// stored SIZE before issuing the range read.
pub fn read(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    size: u64,
    offset: u64,
) -> FsResult<Vec<u8>> {
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let file_size: u64 = store
        .get(&codec::inode_key(&cfg.prefix, ino, Attr::Size))
        .and_then(|v| std::str::from_utf8(&v).ok().and_then(|s| s.parse().ok()))
        .unwrap_or(0);

    let mut size = size.min(file_size);
    if offset >= file_size {
        return Ok(Vec::new());
    }
    if offset + size > file_size {
        size = file_size - offset;
    }
    if size == 0 {
        return Ok(Vec::new());
    }

    let end = offset + size - 1;
    store
        .getrange(
            &codec::inode_key(&cfg.prefix, ino, Attr::Data),
            offset as i64,
            end as i64,
        )
        .ok_or(Errno::EIO)
}

/// write(path, buf, size, offset) (spec.md §4.6). Offset-zero writes
/// replace DATA outright; positive-offset writes append, matching the
/// documented append-only limitation for mid-file rewrites (spec.md §9).
pub fn write(
    store: &mut dyn Store,
    cfg: &Config,
    path: &[u8],
    buf: &[u8],
    offset: u64,
    now: i64,
) -> FsResult<u32> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;

    let ok = if offset == 0 {
        store.exec_batch(vec![Op::Mset(vec![
            (
                codec::inode_key(&cfg.prefix, ino, Attr::Size),
                buf.len().to_string().into_bytes(),
            ),
            (
                codec::inode_key(&cfg.prefix, ino, Attr::Mtime),
                now.to_string().into_bytes(),
            ),
            (codec::inode_key(&cfg.prefix, ino, Attr::Data), buf.to_vec()),
        ])])
    } else {
        let mut ops = vec![
            Op::IncrBy(codec::inode_key(&cfg.prefix, ino, Attr::Size), buf.len() as i64),
            Op::Append(codec::inode_key(&cfg.prefix, ino, Attr::Data), buf.to_vec()),
        ];
        if !cfg.fast {
            ops.push(Op::Mset(vec![(
                codec::inode_key(&cfg.prefix, ino, Attr::Mtime),
                now.to_string().into_bytes(),
            )]));
        }
        store.exec_batch(ops)
    };
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(buf.len() as u32)
}

/// truncate(path, newsize) (spec.md §4.6, redesigned per SPEC_FULL.md:
/// honors the requested size instead of always truncating to zero).
pub fn truncate(store: &mut dyn Store, cfg: &Config, path: &[u8], newsize: u64, now: i64) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, path).ok_or(Errno::ENOENT)?;
    let attrs = inode::read_attrs(store, &cfg.prefix, ino).ok_or(Errno::ENOENT)?;
    if attrs.kind == FileKind::Dir {
        return Err(Errno::ENOENT);
    }

    let data_key = codec::inode_key(&cfg.prefix, ino, Attr::Data);
    let mut data = store.get(&data_key).unwrap_or_default();
    data.resize(newsize as usize, 0);

    let ok = store.exec_batch(vec![Op::Mset(vec![
        (
            codec::inode_key(&cfg.prefix, ino, Attr::Size),
            newsize.to_string().into_bytes(),
        ),
        (
            codec::inode_key(&cfg.prefix, ino, Attr::Mtime),
            now.to_string().into_bytes(),
        ),
        (data_key, data),
    ])]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(())
}

/// rename(old, new) (spec.md §4.6). Does not check whether `new` already
/// exists, and does not recurse into children — subtree paths continue to
/// resolve correctly since only the renamed inode's NAME and
/// parent-membership change.
pub fn rename(store: &mut dyn Store, cfg: &Config, old: &[u8], new: &[u8]) -> FsResult<()> {
    if cfg.read_only {
        return Err(Errno::EPERM);
    }
    let ino = resolver::resolve(store, &cfg.prefix, old).ok_or(Errno::ENOENT)?;
    let (old_parent_path, _) = split(old)?;
    let (new_parent_path, new_name) = split(new)?;
    let old_parent = resolver::resolve(store, &cfg.prefix, old_parent_path).ok_or(Errno::ENOENT)?;
    let new_parent = resolver::resolve(store, &cfg.prefix, new_parent_path).ok_or(Errno::ENOENT)?;

    let ok = store.exec_batch(vec![
        Op::Mset(vec![(
            codec::inode_key(&cfg.prefix, ino, Attr::Name),
            new_name.to_vec(),
        )]),
        Op::Srem(codec::dirent_key(&cfg.prefix, old_parent), ino.to_string()),
        Op::Sadd(codec::dirent_key(&cfg.prefix, new_parent), ino.to_string()),
    ]);
    if !ok {
        return Err(Errno::EIO);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_store::FakeStore;

    fn cfg() -> Config {
        Config {
            read_only: false,
            fast: false,
            ..Config::default()
        }
    }

    #[test]
    fn create_then_getattr_round_trips() {
        let mut store = FakeStore::new();
        let c = cfg();
        let ino = create(&mut store, &c, b"/a.txt", 0o644, 501, 20, 1000).unwrap();
        let stat = getattr(&mut store, &c, b"/a.txt", 501, 20, 1001).unwrap();
        assert_eq!(stat.ino, ino);
        assert_eq!(stat.kind, FileKind::File);
        assert_eq!(stat.mode & 0o777, 0o644);
        assert_eq!(stat.size, 0);
        assert_eq!(stat.uid, 501);
        assert_eq!(stat.gid, 20);
        assert_eq!(stat.nlink, 1);
    }

    #[test]
    fn readdir_of_missing_path_yields_just_dot_and_dotdot() {
        let mut store = FakeStore::new();
        let c = cfg();
        let entries = readdir(&mut store, &c, b"/nope").unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].0, b".");
        assert_eq!(entries[1].0, b"..");
    }

    #[test]
    fn mkdir_then_readdir_lists_basename_once() {
        let mut store = FakeStore::new();
        let c = cfg();
        mkdir(&mut store, &c, b"/sub", 0o755, 0, 0, 1000).unwrap();
        let entries = readdir(&mut store, &c, b"/").unwrap();
        let matches: Vec<_> = entries
            .iter()
            .filter(|(name, _, _)| name == b"sub")
            .collect();
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn symlink_then_readlink_round_trips() {
        let mut store = FakeStore::new();
        let c = cfg();
        symlink(&mut store, &c, b"/link", b"/etc/passwd", 0, 0, 1000).unwrap();
        let target = readlink(&mut store, &c, b"/link").unwrap();
        assert_eq!(target, b"/etc/passwd");
    }

    #[test]
    fn write_then_read_single_shot() {
        let mut store = FakeStore::new();
        let c = cfg();
        create(&mut store, &c, b"/f", 0o644, 0, 0, 1000).unwrap();
        write(&mut store, &c, b"/f", b"hello", 0, 1000).unwrap();
        let out = read(&mut store, &c, b"/f", 5, 0).unwrap();
        assert_eq!(out, b"hello");
    }

    #[test]
    fn two_writes_concatenate() {
        let mut store = FakeStore::new();
        let c = cfg();
        create(&mut store, &c, b"/f", 0o644, 0, 0, 1000).unwrap();
        write(&mut store, &c, b"/f", b"abc", 0, 1000).unwrap();
        write(&mut store, &c, b"/f", b"def", 3, 1000).unwrap();
        let out = read(&mut store, &c, b"/f", 6, 0).unwrap();
        assert_eq!(out, b"abcdef");
    }

    #[test]
    fn truncate_to_zero_empties_file() {
        let mut store = FakeStore::new();
        let c = cfg();
        create(&mut store, &c, b"/f", 0o644, 0, 0, 1000).unwrap();
        write(&mut store, &c, b"/f", b"abc", 0, 1000).unwrap();
        truncate(&mut store, &c, b"/f", 0, 1000).unwrap();
        let stat = getattr(&mut store, &c, b"/f", 0, 0, 1000).unwrap();
        assert_eq!(stat.size, 0);
        assert_eq!(read(&mut store, &c, b"/f", 10, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn unlink_removes_attrs_and_parent_membership() {
        let mut store = FakeStore::new();
        let c = cfg();
        let ino = create(&mut store, &c, b"/f", 0o644, 0, 0, 1000).unwrap();
        unlink(&mut store, &c, b"/f").unwrap();
        assert!(inode::read_attrs(&mut store, &c.prefix, ino).is_none());
        assert!(resolver::resolve(&mut store, &c.prefix, b"/f").is_none());
    }

    #[test]
    fn rmdir_refuses_non_empty() {
        let mut store = FakeStore::new();
        let c = cfg();
        mkdir(&mut store, &c, b"/p", 0o755, 0, 0, 1000).unwrap();
        create(&mut store, &c, b"/p/q", 0o644, 0, 0, 1000).unwrap();
        assert_eq!(rmdir(&mut store, &c, b"/p"), Err(Errno::ENOTEMPTY));
        assert!(resolver::resolve(&mut store, &c.prefix, b"/p").is_some());
        assert!(resolver::resolve(&mut store, &c.prefix, b"/p/q").is_some());
    }

    #[test]
    fn rename_updates_name_and_parent_membership() {
        let mut store = FakeStore::new();
        let c = cfg();
        mkdir(&mut store, &c, b"/foo", 0o755, 0, 0, 1000).unwrap();
        mkdir(&mut store, &c, b"/foo/bar", 0o755, 0, 0, 1000).unwrap();
        rename(&mut store, &c, b"/foo", b"/steve").unwrap();
        assert!(resolver::resolve(&mut store, &c.prefix, b"/foo").is_none());
        assert!(resolver::resolve(&mut store, &c.prefix, b"/steve").is_some());
        assert!(resolver::resolve(&mut store, &c.prefix, b"/steve/bar").is_some());
    }

    #[test]
    fn read_only_rejects_mutation() {
        let mut store = FakeStore::new();
        let mut c = cfg();
        c.read_only = true;
        assert_eq!(
            mkdir(&mut store, &c, b"/x", 0o755, 0, 0, 1000),
            Err(Errno::EPERM)
        );
        assert_eq!(
            create(&mut store, &c, b"/x", 0o644, 0, 0, 1000),
            Err(Errno::EPERM)
        );
    }

    #[test]
    fn rename_preserves_attributes_of_renamed_subtree() {
        let mut store = FakeStore::new();
        let c = cfg();
        mkdir(&mut store, &c, b"/foo", 0o755, 0, 0, 1000).unwrap();
        mkdir(&mut store, &c, b"/foo/bar", 0o755, 0, 0, 1000).unwrap();
        mkdir(&mut store, &c, b"/foo/bar/baz", 0o755, 0, 0, 1000).unwrap();
        create(&mut store, &c, b"/foo/bar/baz/passwd.new", 0o600, 501, 20, 1000).unwrap();
        write(&mut store, &c, b"/foo/bar/baz/passwd.new", b"root:x:0:0", 0, 1000).unwrap();

        rename(&mut store, &c, b"/foo/bar", b"/foo/steve").unwrap();

        assert!(resolver::resolve(&mut store, &c.prefix, b"/foo/bar").is_none());
        let moved = resolver::resolve(&mut store, &c.prefix, b"/foo/steve/baz/passwd.new");
        assert!(moved.is_some());
        let stat = getattr(&mut store, &c, b"/foo/steve/baz/passwd.new", 501, 20, 1000).unwrap();
        assert_eq!(stat.mode & 0o777, 0o600);
        assert_eq!(stat.uid, 501);
        assert_eq!(stat.gid, 20);
        assert_eq!(stat.size, 10);
        assert_eq!(
            read(&mut store, &c, b"/foo/steve/baz/passwd.new", 10, 0).unwrap(),
            b"root:x:0:0"
        );
    }

    #[test]
    fn deleting_a_thousand_files_leaves_only_the_counter_key() {
        let mut store = FakeStore::new();
        let c = cfg();
        let mut names = Vec::new();
        for i in 0..1000 {
            let name = format!("/f{i}");
            create(&mut store, &c, name.as_bytes(), 0o644, 0, 0, 1000).unwrap();
            names.push(name);
        }
        for name in &names {
            unlink(&mut store, &c, name.as_bytes()).unwrap();
        }
        assert_eq!(store.key_count_with_prefix(&c.prefix), 1);
    }

    #[test]
    fn create_rejects_existing_basename() {
        let mut store = FakeStore::new();
        let c = cfg();
        create(&mut store, &c, b"/dup", 0o644, 0, 0, 1000).unwrap();
        assert_eq!(
            create(&mut store, &c, b"/dup", 0o644, 0, 0, 1000),
            Err(Errno::EEXIST)
        );
    }
}
