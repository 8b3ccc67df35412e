//! Backing-store client façade.
//!
//! Owns the live connection, lazily establishes it, and re-establishes it
//! on any failure with a 1.5 second connect timeout — aborting the process
//! if that reconnect attempt also fails, since a filesystem cannot usefully
//! run without its backing store (spec.md §4.2).
//!
//! Commands are issued through the [`Store`] trait so that the operation
//! handlers in [`crate::ops`] can be exercised in tests against
//! [`crate::fake_store::FakeStore`] without a live Redis server.

use std::time::Duration;

use log::{error, warn};
use redis::{Client, Commands, Connection, RedisResult};

const CONNECT_TIMEOUT: Duration = Duration::from_millis(1500);

/// A queued mutation, batched together with others and issued as a single
/// pipelined round trip by [`Store::exec_batch`].
#[derive(Debug, Clone)]
pub enum Op {
    /// `SADD key member`
    Sadd(String, String),
    /// `SREM key member`
    Srem(String, String),
    /// `MSET k1 v1 k2 v2 ...` — several independent attribute keys set together.
    Mset(Vec<(String, Vec<u8>)>),
    /// `APPEND key value`
    Append(String, Vec<u8>),
    /// `INCRBY key delta`
    IncrBy(String, i64),
    /// `DEL k1 k2 ...`
    Del(Vec<String>),
}

/// The command vocabulary spec.md §6.2 requires of the backing store.
pub trait Store: Send {
    /// Sends a liveness ping; reconnects on failure, aborting the process
    /// if the reconnect itself cannot be made.
    fn ensure_alive(&mut self);

    fn get(&mut self, key: &str) -> Option<Vec<u8>>;

    /// Batched multi-get, one reply slot per input key, in order.
    fn mget(&mut self, keys: &[String]) -> Vec<Option<Vec<u8>>>;

    /// Unordered members of a set key. Empty if the key does not exist.
    fn smembers(&mut self, key: &str) -> Vec<String>;

    /// Atomic increment; `None` if the reply was not an integer (§4.4).
    fn incr(&mut self, key: &str) -> Option<i64>;

    /// Byte-range read of a string key. Tries the modern range command
    /// first, falling back to the legacy name older servers use (§4.6 read).
    fn getrange(&mut self, key: &str, start: i64, end: i64) -> Option<Vec<u8>>;

    /// Issues every queued op as a single pipelined batch and drains all
    /// replies before returning (spec.md §4.2, §5 ordering). Returns `false`
    /// on any command-level error reply, which callers surface as `-EIO`.
    fn exec_batch(&mut self, ops: Vec<Op>) -> bool;
}

/// Live façade over a `redis`-protocol backing store.
pub struct RedisStore {
    client: Client,
    conn: Option<Connection>,
}

impl RedisStore {
    pub fn new(host: &str, port: u16) -> RedisStore {
        let url = format!("redis://{host}:{port}/");
        let client = Client::open(url).expect("malformed backing-store address");
        RedisStore { client, conn: None }
    }

    fn connect_or_abort(&mut self) {
        match self.client.get_connection_with_timeout(CONNECT_TIMEOUT) {
            Ok(conn) => self.conn = Some(conn),
            Err(err) => {
                error!("cannot connect to backing store: {err}");
                std::process::exit(1);
            }
        }
    }

    fn conn(&mut self) -> &mut Connection {
        if self.conn.is_none() {
            self.connect_or_abort();
        }
        self.conn.as_mut().expect("connection established above")
    }
}

impl Store for RedisStore {
    fn ensure_alive(&mut self) {
        let alive = match &mut self.conn {
            Some(conn) => redis::cmd("PING").query::<String>(conn).is_ok(),
            None => false,
        };
        if !alive {
            self.connect_or_abort();
        }
    }

    fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let result: RedisResult<Option<Vec<u8>>> = self.conn().get(key);
        result.unwrap_or(None)
    }

    fn mget(&mut self, keys: &[String]) -> Vec<Option<Vec<u8>>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let result: RedisResult<Vec<Option<Vec<u8>>>> = self.conn().mget(keys);
        result.unwrap_or_else(|_| vec![None; keys.len()])
    }

    fn smembers(&mut self, key: &str) -> Vec<String> {
        let result: RedisResult<Vec<String>> = self.conn().smembers(key);
        result.unwrap_or_default()
    }

    fn incr(&mut self, key: &str) -> Option<i64> {
        let result: RedisResult<i64> = self.conn().incr(key, 1);
        result.ok()
    }

    fn getrange(&mut self, key: &str, start: i64, end: i64) -> Option<Vec<u8>> {
        let result: RedisResult<Vec<u8>> = self.conn().getrange(key, start as isize, end as isize);
        match result {
            Ok(bytes) => Some(bytes),
            Err(_) => {
                // Older servers expose the same semantics under SUBSTR.
                let legacy: RedisResult<Vec<u8>> = redis::cmd("SUBSTR")
                    .arg(key)
                    .arg(start)
                    .arg(end)
                    .query(self.conn());
                match legacy {
                    Ok(bytes) => Some(bytes),
                    Err(err) => {
                        warn!("getrange/substr failed for {key}: {err}");
                        None
                    }
                }
            }
        }
    }

    fn exec_batch(&mut self, ops: Vec<Op>) -> bool {
        if ops.is_empty() {
            return true;
        }
        let mut pipe = redis::pipe();
        for op in &ops {
            match op {
                Op::Sadd(key, member) => {
                    pipe.sadd(key, member).ignore();
                }
                Op::Srem(key, member) => {
                    pipe.srem(key, member).ignore();
                }
                Op::Mset(pairs) => {
                    pipe.mset(
                        &pairs
                            .iter()
                            .map(|(k, v)| (k.as_str(), v.as_slice()))
                            .collect::<Vec<_>>(),
                    )
                    .ignore();
                }
                Op::Append(key, value) => {
                    pipe.append(key, value.as_slice()).ignore();
                }
                Op::IncrBy(key, delta) => {
                    pipe.incr(key, *delta).ignore();
                }
                Op::Del(keys) => {
                    pipe.del(keys).ignore();
                }
            }
        }
        let conn = self.conn();
        let result: RedisResult<()> = pipe.query(conn);
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("pipelined batch failed: {err}");
                false
            }
        }
    }
}
