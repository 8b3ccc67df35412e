//! Companion snapshot tool (spec.md §6.3): a one-shot namespace cloner.
//! Not synchronized with a running filesystem — run it against a quiesced
//! or unmounted store.

use clap::{crate_version, Arg, Command};
use log::{error, info, warn, LevelFilter};
use redis::{Connection, RedisResult, Value};

fn key_type(conn: &mut Connection, key: &str) -> RedisResult<String> {
    redis::cmd("TYPE").arg(key).query(conn)
}

fn rewrite_key(key: &str, old_prefix: &str, new_prefix: &str) -> String {
    format!("{new_prefix}{}", &key[old_prefix.len()..])
}

fn clone_string(conn: &mut Connection, key: &str, dest: &str) -> RedisResult<()> {
    let value: Vec<u8> = redis::cmd("GET").arg(key).query(conn)?;
    redis::cmd("SET").arg(dest).arg(value).query(conn)
}

fn clone_set(conn: &mut Connection, key: &str, dest: &str) -> RedisResult<()> {
    let members: Vec<String> = redis::cmd("SMEMBERS").arg(key).query(conn)?;
    if members.is_empty() {
        return Ok(());
    }
    let mut cmd = redis::cmd("SADD");
    cmd.arg(dest);
    for member in &members {
        cmd.arg(member);
    }
    cmd.query(conn)
}

/// Enumerates every key matching `<old_prefix>*` via `SCAN` and copies it
/// under `<new_prefix>`. Aborts on the first key of an unexpected type
/// (spec.md §6.3 "unknown types abort").
fn run(conn: &mut Connection, old_prefix: &str, new_prefix: &str) -> Result<u64, String> {
    let pattern = format!("{old_prefix}*");
    let mut cursor: u64 = 0;
    let mut copied: u64 = 0;

    loop {
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(&pattern)
            .query(conn)
            .map_err(|e| format!("SCAN failed: {e}"))?;

        for key in &keys {
            let dest = rewrite_key(key, old_prefix, new_prefix);
            let kind = key_type(conn, key).map_err(|e| format!("TYPE {key} failed: {e}"))?;
            match kind.as_str() {
                "string" => clone_string(conn, key, &dest)
                    .map_err(|e| format!("cloning string {key}: {e}"))?,
                "set" => {
                    clone_set(conn, key, &dest).map_err(|e| format!("cloning set {key}: {e}"))?
                }
                other => return Err(format!("key {key} has unexpected type {other}")),
            }
            copied += 1;
        }

        cursor = next_cursor;
        if cursor == 0 {
            break;
        }
    }
    Ok(copied)
}

fn main() {
    let matches = Command::new("redisfs-snapshot")
        .version(crate_version!())
        .about("Clones every key under one prefix to another prefix")
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .default_value("localhost"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .default_value("6379"),
        )
        .arg(
            Arg::new("old-prefix")
                .long("old-prefix")
                .value_name("PREFIX")
                .required(true),
        )
        .arg(
            Arg::new("new-prefix")
                .long("new-prefix")
                .value_name("PREFIX")
                .required(true),
        )
        .arg(
            Arg::new("v")
                .short('v')
                .action(clap::ArgAction::Count)
                .help("Sets the level of verbosity"),
        )
        .get_matches();

    let verbosity = matches.get_count("v");
    let log_level = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::builder()
        .format_timestamp_nanos()
        .filter_level(log_level)
        .init();

    let host = matches.get_one::<String>("host").unwrap();
    let port: u16 = matches
        .get_one::<String>("port")
        .unwrap()
        .parse()
        .unwrap_or(6379);
    let old_prefix = matches.get_one::<String>("old-prefix").unwrap();
    let new_prefix = matches.get_one::<String>("new-prefix").unwrap();

    if old_prefix == new_prefix {
        error!("--old-prefix and --new-prefix must differ");
        std::process::exit(1);
    }

    let url = format!("redis://{host}:{port}/");
    let client = match redis::Client::open(url) {
        Ok(client) => client,
        Err(err) => {
            error!("malformed backing-store address: {err}");
            std::process::exit(1);
        }
    };
    let mut conn = match client.get_connection() {
        Ok(conn) => conn,
        Err(err) => {
            error!("cannot connect to backing store: {err}");
            std::process::exit(1);
        }
    };

    let ping: RedisResult<Value> = redis::cmd("PING").query(&mut conn);
    if ping.is_err() {
        warn!("PING failed before snapshot; continuing anyway");
    }

    match run(&mut conn, old_prefix, new_prefix) {
        Ok(copied) => info!("snapshot complete: {copied} keys copied from {old_prefix} to {new_prefix}"),
        Err(err) => {
            error!("snapshot aborted: {err}");
            std::process::exit(1);
        }
    }
}
