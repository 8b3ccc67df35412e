//! Process-wide configuration, gathered into a single value constructed at
//! startup (spec.md §9 "Process-wide state -> explicit configuration
//! record") rather than kept as module-level globals.

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub mount: String,
    pub prefix: String,
    pub read_only: bool,
    /// Skips atime updates and mtime updates on appending writes.
    pub fast: bool,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            host: "localhost".to_string(),
            port: 6379,
            mount: "/mnt/redis".to_string(),
            prefix: "skx".to_string(),
            read_only: false,
            fast: false,
        }
    }
}
