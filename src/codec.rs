//! Namespace codec: maps `(prefix, inode, attribute)` and `(prefix, inode)`
//! to the exact key names the backing store sees. The textual form is
//! bit-stable (spec.md §6.1) — the companion snapshot tool and any operator
//! tooling parse these same strings.

use std::fmt;

/// Attribute names, one per independent store key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attr {
    Name,
    Type,
    Mode,
    Uid,
    Gid,
    Size,
    Atime,
    Ctime,
    Mtime,
    Link,
    Target,
    Data,
}

impl Attr {
    /// All attributes an inode ever carries, in no particular order other
    /// than stable enough for deterministic batch deletes.
    pub const ALL: [Attr; 12] = [
        Attr::Name,
        Attr::Type,
        Attr::Mode,
        Attr::Uid,
        Attr::Gid,
        Attr::Size,
        Attr::Atime,
        Attr::Ctime,
        Attr::Mtime,
        Attr::Link,
        Attr::Target,
        Attr::Data,
    ];

    fn as_str(self) -> &'static str {
        match self {
            Attr::Name => "NAME",
            Attr::Type => "TYPE",
            Attr::Mode => "MODE",
            Attr::Uid => "UID",
            Attr::Gid => "GID",
            Attr::Size => "SIZE",
            Attr::Atime => "ATIME",
            Attr::Ctime => "CTIME",
            Attr::Mtime => "MTIME",
            Attr::Link => "LINK",
            Attr::Target => "TARGET",
            Attr::Data => "DATA",
        }
    }
}

impl fmt::Display for Attr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sentinel inode number reserved for the (never-materialized) root.
pub const ROOT_INODE: i64 = -99;

/// Key of a single inode attribute: `P:INODE:i:A`.
pub fn inode_key(prefix: &str, inode: i64, attr: Attr) -> String {
    format!("{prefix}:INODE:{inode}:{attr}")
}

/// Key of the directory-entry set of a directory inode: `P:DIRENT:i`.
pub fn dirent_key(prefix: &str, inode: i64) -> String {
    format!("{prefix}:DIRENT:{inode}")
}

/// Key of the global, atomically-incremented inode counter: `P:GLOBAL:INODE`.
pub fn counter_key(prefix: &str) -> String {
    format!("{prefix}:GLOBAL:INODE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_key_layout() {
        assert_eq!(inode_key("skx", 42, Attr::Name), "skx:INODE:42:NAME");
        assert_eq!(inode_key("skx", 42, Attr::Data), "skx:INODE:42:DATA");
    }

    #[test]
    fn dirent_key_layout() {
        assert_eq!(dirent_key("skx", ROOT_INODE), "skx:DIRENT:-99");
        assert_eq!(dirent_key("skx", 7), "skx:DIRENT:7");
    }

    #[test]
    fn counter_key_layout() {
        assert_eq!(counter_key("skx"), "skx:GLOBAL:INODE");
    }
}
