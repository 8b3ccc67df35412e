use std::io::ErrorKind;
use std::path::Path;

use clap::{crate_version, Arg, ArgAction, Command};
use log::{error, LevelFilter};

use redisfs::config::Config;
use redisfs::fs::RedisFs;
use redisfs::store::RedisStore;

fn main() {
    let matches = Command::new("redisfs")
        .version(crate_version!())
        .about("FUSE filesystem backed by a Redis-style key/value and set store")
        .arg(
            Arg::new("mount")
                .long("mount")
                .value_name("PATH")
                .default_value("/mnt/redis")
                .help("Directory to mount the filesystem at"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .default_value("localhost")
                .help("Backing store host"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .default_value("6379")
                .help("Backing store port"),
        )
        .arg(
            Arg::new("prefix")
                .long("prefix")
                .value_name("PREFIX")
                .default_value("skx")
                .help("Key namespace prefix"),
        )
        .arg(
            Arg::new("read-only")
                .long("read-only")
                .action(ArgAction::SetTrue)
                .help("Reject all mutating operations"),
        )
        .arg(
            Arg::new("fast")
                .long("fast")
                .action(ArgAction::SetTrue)
                .help("Skip atime updates and mtime updates on appending writes"),
        )
        .arg(
            Arg::new("debug")
                .long("debug")
                .action(ArgAction::SetTrue)
                .help("Enable debug-level logging"),
        )
        .get_matches();

    let log_level = if matches.get_flag("debug") {
        LevelFilter::Debug
    } else {
        LevelFilter::Error
    };
    env_logger::builder()
        .format_timestamp_nanos()
        .filter_level(log_level)
        .init();

    let mount = matches.get_one::<String>("mount").unwrap().to_string();
    if !Path::new(&mount).is_dir() {
        error!("mount point {mount} is not a directory");
        std::process::exit(1);
    }

    let cfg = Config {
        host: matches.get_one::<String>("host").unwrap().to_string(),
        port: matches
            .get_one::<String>("port")
            .unwrap()
            .parse()
            .unwrap_or_else(|_| {
                error!("invalid --port");
                std::process::exit(1);
            }),
        mount: mount.clone(),
        prefix: matches.get_one::<String>("prefix").unwrap().to_string(),
        read_only: matches.get_flag("read-only"),
        fast: matches.get_flag("fast"),
    };

    let store = RedisStore::new(&cfg.host, cfg.port);
    let fs = RedisFs::new(Box::new(store), cfg.clone());

    let mut options = vec![fuser::MountOption::FSName("redisfs".to_string())];
    if cfg.read_only {
        options.push(fuser::MountOption::RO);
    }

    let result = fuser::mount2(fs, &mount, &options);
    if let Err(e) = result {
        // Usually indicates "user_allow_other" is missing from /etc/fuse.conf.
        if e.kind() == ErrorKind::PermissionDenied {
            error!("{e}");
            std::process::exit(2);
        } else {
            error!("{e}");
            std::process::exit(1);
        }
    }
}
