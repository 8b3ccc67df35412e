//! The `fuser::Filesystem` adapter.
//!
//! The kernel addresses inodes by number, but this store's command protocol
//! only knows how to resolve absolute paths (spec.md §4.5). Every inode the
//! kernel has ever looked up gets a `(parent, name)` entry in `ino_cache` so
//! its path can be reconstructed; the cache holds topology only, never
//! attributes, so every operation still re-resolves and re-reads through
//! [`crate::ops`] exactly as spec.md requires — nothing here is a metadata
//! cache.
//!
//! Kernel inode numbers and this crate's store inode numbers are not the
//! same number space: kernel inode 1 is reserved for the mountpoint root,
//! which the store represents with the sentinel [`ROOT_INODE`]. Store
//! inodes (allocated starting at 1 by [`crate::alloc`]) are shifted by one
//! to make room for it.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuser::{
    Errno, FileAttr, FileHandle, FileType, Filesystem, FopenFlags, Generation, INodeNo,
    KernelConfig, OpenFlags, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use log::debug;

use crate::codec::ROOT_INODE;
use crate::config::Config;
use crate::inode::FileKind;
use crate::ops::{self, Stat};
use crate::store::Store;

/// Attribute and entry TTL handed back to the kernel: always zero, since
/// nothing here is cached locally (spec.md §4.1 "no caching of inode
/// metadata").
const TTL: Duration = Duration::new(0, 0);

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs as u64)
    } else {
        UNIX_EPOCH - Duration::from_secs((-secs) as u64)
    }
}

fn to_kernel_ino(store_ino: i64) -> u64 {
    (store_ino as u64).wrapping_add(1)
}

fn file_type(kind: FileKind) -> FileType {
    match kind {
        FileKind::File => FileType::RegularFile,
        FileKind::Dir => FileType::Directory,
        FileKind::Link => FileType::Symlink,
    }
}

fn file_attr(stat: &Stat) -> FileAttr {
    FileAttr {
        ino: INodeNo(to_kernel_ino(stat.ino)),
        size: stat.size,
        blocks: stat.size.div_ceil(512),
        atime: system_time(stat.atime),
        mtime: system_time(stat.mtime),
        ctime: system_time(stat.ctime),
        crtime: UNIX_EPOCH,
        kind: file_type(stat.kind),
        perm: (stat.mode & 0o7777) as u16,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: 512,
        flags: 0,
    }
}

/// Topology-only cache mapping a kernel inode to its parent and basename,
/// rebuilt as the kernel looks entries up. Never holds attributes, sizes,
/// or timestamps.
struct FsState {
    store: Box<dyn Store>,
    cfg: Config,
    ino_cache: HashMap<u64, (u64, Vec<u8>)>,
}

impl FsState {
    fn remember(&mut self, kernel_parent: u64, name: &[u8], kernel_ino: u64) {
        self.ino_cache
            .insert(kernel_ino, (kernel_parent, name.to_vec()));
    }

    /// Reconstructs the absolute path of a kernel inode by walking the
    /// cache back to the root. Returns `None` if some ancestor was never
    /// looked up (the kernel always looks up every ancestor before a
    /// descendant, so in practice this only fails for a stale or unknown
    /// inode number).
    fn path_of(&self, kernel_ino: u64) -> Option<Vec<u8>> {
        if kernel_ino == INodeNo::ROOT.0 {
            return Some(b"/".to_vec());
        }
        let mut components = Vec::new();
        let mut current = kernel_ino;
        while current != INodeNo::ROOT.0 {
            let (parent, name) = self.ino_cache.get(&current)?;
            components.push(name.clone());
            current = *parent;
        }
        components.reverse();
        let mut path = Vec::new();
        for component in components {
            path.push(b'/');
            path.extend_from_slice(&component);
        }
        Some(path)
    }

    fn child_path(&self, parent: u64, name: &OsStr) -> Option<Vec<u8>> {
        let parent_path = self.path_of(parent)?;
        let mut path = if parent_path == b"/" {
            Vec::new()
        } else {
            parent_path
        };
        path.push(b'/');
        path.extend_from_slice(name.as_bytes());
        Some(path)
    }
}

/// A FUSE filesystem whose namespace lives entirely in a remote key/value
/// and set store. All state lives behind a single mutex (spec.md §5): every
/// operation runs to completion before the next begins, so the backing
/// store never observes interleaved commands from two callbacks.
pub struct RedisFs {
    state: Mutex<FsState>,
}

impl RedisFs {
    pub fn new(store: Box<dyn Store>, cfg: Config) -> RedisFs {
        RedisFs {
            state: Mutex::new(FsState {
                store,
                cfg,
                ino_cache: HashMap::new(),
            }),
        }
    }
}

impl Filesystem for RedisFs {
    fn init(&mut self, _req: &Request, _config: &mut KernelConfig) -> std::io::Result<()> {
        self.state.lock().unwrap().store.ensure_alive();
        Ok(())
    }

    fn lookup(&self, _req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEntry) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.child_path(parent.0, name) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::getattr(
            state.store.as_mut(),
            &state.cfg,
            &path,
            _req.uid(),
            _req.gid(),
            now_secs(),
        ) {
            Ok(stat) => {
                let kernel_ino = to_kernel_ino(stat.ino);
                state.remember(parent.0, name.as_bytes(), kernel_ino);
                reply.entry(&TTL, &file_attr(&stat), Generation(0));
            }
            Err(err) => reply.error(err),
        }
    }

    fn forget(&self, _req: &Request, _ino: INodeNo, _nlookup: u64) {}

    fn getattr(&self, req: &Request, ino: INodeNo, _fh: Option<FileHandle>, reply: ReplyAttr) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::getattr(
            state.store.as_mut(),
            &state.cfg,
            &path,
            req.uid(),
            req.gid(),
            now_secs(),
        ) {
            Ok(stat) => reply.attr(&TTL, &file_attr(&stat)),
            Err(err) => reply.error(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn setattr(
        &self,
        req: &Request,
        ino: INodeNo,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        _fh: Option<FileHandle>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<fuser::BsdFileFlags>,
        reply: ReplyAttr,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let now = now_secs();

        if let Some(mode) = mode {
            if let Err(err) = ops::chmod(state.store.as_mut(), &state.cfg, &path, mode, now) {
                reply.error(err);
                return;
            }
        }
        if uid.is_some() || gid.is_some() {
            if let Err(err) = ops::chown(state.store.as_mut(), &state.cfg, &path, uid, gid, now) {
                reply.error(err);
                return;
            }
        }
        if let Some(size) = size {
            if let Err(err) = ops::truncate(state.store.as_mut(), &state.cfg, &path, size, now) {
                reply.error(err);
                return;
            }
        }
        if atime.is_some() || mtime.is_some() {
            let resolve = |t: TimeOrNow| match t {
                TimeOrNow::SpecificTime(t) => t
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs() as i64)
                    .unwrap_or(0),
                TimeOrNow::Now => now,
            };
            if let Err(err) = ops::utimens(
                state.store.as_mut(),
                &state.cfg,
                &path,
                atime.map(resolve),
                mtime.map(resolve),
            ) {
                reply.error(err);
                return;
            }
        }

        match ops::getattr(
            state.store.as_mut(),
            &state.cfg,
            &path,
            req.uid(),
            req.gid(),
            now,
        ) {
            Ok(stat) => reply.attr(&TTL, &file_attr(&stat)),
            Err(err) => reply.error(err),
        }
    }

    fn readlink(&self, _req: &Request, ino: INodeNo, reply: ReplyData) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::readlink(state.store.as_mut(), &state.cfg, &path) {
            Ok(target) => reply.data(&target),
            Err(err) => reply.error(err),
        }
    }

    fn mkdir(
        &self,
        req: &Request,
        parent: INodeNo,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.child_path(parent.0, name) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let now = now_secs();
        match ops::mkdir(
            state.store.as_mut(),
            &state.cfg,
            &path,
            mode,
            req.uid(),
            req.gid(),
            now,
        ) {
            Ok(store_ino) => {
                let kernel_ino = to_kernel_ino(store_ino);
                state.remember(parent.0, name.as_bytes(), kernel_ino);
                let stat = Stat {
                    ino: store_ino,
                    kind: FileKind::Dir,
                    mode,
                    uid: req.uid(),
                    gid: req.gid(),
                    size: 0,
                    atime: now,
                    mtime: now,
                    ctime: now,
                    nlink: 1,
                };
                reply.entry(&TTL, &file_attr(&stat), Generation(0));
            }
            Err(err) => reply.error(err),
        }
    }

    fn create(
        &self,
        req: &Request,
        parent: INodeNo,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.child_path(parent.0, name) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let now = now_secs();
        match ops::create(
            state.store.as_mut(),
            &state.cfg,
            &path,
            mode,
            req.uid(),
            req.gid(),
            now,
        ) {
            Ok(store_ino) => {
                let kernel_ino = to_kernel_ino(store_ino);
                state.remember(parent.0, name.as_bytes(), kernel_ino);
                let stat = Stat {
                    ino: store_ino,
                    kind: FileKind::File,
                    mode,
                    uid: req.uid(),
                    gid: req.gid(),
                    size: 0,
                    atime: now,
                    mtime: now,
                    ctime: now,
                    nlink: 1,
                };
                let _ = flags;
                reply.created(
                    &TTL,
                    &file_attr(&stat),
                    Generation(0),
                    FileHandle(kernel_ino),
                    0,
                );
            }
            Err(err) => reply.error(err),
        }
    }

    fn symlink(
        &self,
        req: &Request,
        parent: INodeNo,
        link_name: &OsStr,
        target: &Path,
        reply: ReplyEntry,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.child_path(parent.0, link_name) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let now = now_secs();
        let target_bytes = target.as_os_str().as_bytes();
        match ops::symlink(
            state.store.as_mut(),
            &state.cfg,
            &path,
            target_bytes,
            req.uid(),
            req.gid(),
            now,
        ) {
            Ok(store_ino) => {
                let kernel_ino = to_kernel_ino(store_ino);
                state.remember(parent.0, link_name.as_bytes(), kernel_ino);
                let stat = Stat {
                    ino: store_ino,
                    kind: FileKind::Link,
                    mode: 0o444,
                    uid: req.uid(),
                    gid: req.gid(),
                    size: target_bytes.len() as u64,
                    atime: now,
                    mtime: now,
                    ctime: now,
                    nlink: 1,
                };
                reply.entry(&TTL, &file_attr(&stat), Generation(0));
            }
            Err(err) => reply.error(err),
        }
    }

    fn unlink(&self, _req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEmpty) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.child_path(parent.0, name) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::unlink(state.store.as_mut(), &state.cfg, &path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err),
        }
    }

    fn rmdir(&self, _req: &Request, parent: INodeNo, name: &OsStr, reply: ReplyEmpty) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.child_path(parent.0, name) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::rmdir(state.store.as_mut(), &state.cfg, &path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err),
        }
    }

    fn rename(
        &self,
        _req: &Request,
        parent: INodeNo,
        name: &OsStr,
        newparent: INodeNo,
        newname: &OsStr,
        _flags: fuser::RenameFlags,
        reply: ReplyEmpty,
    ) {
        let mut state = self.state.lock().unwrap();
        let (Some(old_path), Some(new_path)) = (
            state.child_path(parent.0, name),
            state.child_path(newparent.0, newname),
        ) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::rename(state.store.as_mut(), &state.cfg, &old_path, &new_path) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err),
        }
    }

    fn open(&self, _req: &Request, ino: INodeNo, _flags: OpenFlags, reply: ReplyOpen) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::open_or_access(state.store.as_mut(), &state.cfg, &path, now_secs()) {
            Ok(()) => reply.opened(FileHandle(ino.0), FopenFlags::empty()),
            Err(err) => reply.error(err),
        }
    }

    fn access(&self, _req: &Request, ino: INodeNo, _mask: fuser::AccessFlags, reply: ReplyEmpty) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::open_or_access(state.store.as_mut(), &state.cfg, &path, now_secs()) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(err),
        }
    }

    fn read(
        &self,
        _req: &Request,
        ino: INodeNo,
        _fh: FileHandle,
        offset: u64,
        size: u32,
        _read_flags: fuser::ReadFlags,
        _flags: u32,
        _lock_owner: Option<fuser::LockOwner>,
        reply: ReplyData,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::read(state.store.as_mut(), &state.cfg, &path, size as u64, offset) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(err),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        _req: &Request,
        ino: INodeNo,
        _fh: FileHandle,
        offset: i64,
        data: &[u8],
        _write_flags: fuser::WriteFlags,
        _flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        reply: ReplyWrite,
    ) {
        debug!("write() on {ino:?} offset={offset} size={}", data.len());
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        match ops::write(
            state.store.as_mut(),
            &state.cfg,
            &path,
            data,
            offset.max(0) as u64,
            now_secs(),
        ) {
            Ok(written) => reply.written(written),
            Err(err) => reply.error(err),
        }
    }

    fn release(
        &self,
        _req: &Request,
        _ino: INodeNo,
        _fh: FileHandle,
        _flags: OpenFlags,
        _lock_owner: Option<fuser::LockOwner>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }

    fn readdir(
        &self,
        _req: &Request,
        ino: INodeNo,
        _fh: FileHandle,
        offset: u64,
        mut reply: ReplyDirectory,
    ) {
        let mut state = self.state.lock().unwrap();
        let Some(path) = state.path_of(ino.0) else {
            reply.error(Errno::ENOENT);
            return;
        };
        let entries = match ops::readdir(state.store.as_mut(), &state.cfg, &path) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(err);
                return;
            }
        };

        for (index, (name, kind, store_ino)) in entries.iter().enumerate().skip(offset as usize) {
            let kernel_ino = to_kernel_ino(*store_ino);
            if name != b"." && name != b".." {
                state.remember(ino.0, name, kernel_ino);
            }
            let buffer_full = reply.add(
                INodeNo(kernel_ino),
                index as u64 + 1,
                file_type(*kind),
                OsStr::from_bytes(name),
            );
            if buffer_full {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(
        &self,
        _req: &Request,
        _ino: INodeNo,
        _fh: FileHandle,
        _flags: OpenFlags,
        reply: ReplyEmpty,
    ) {
        reply.ok();
    }
}
