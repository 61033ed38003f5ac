//! sigfs mount daemon
//!
//! Loads a JSON configuration, builds the signal file tree and mounts it.
//! Runs in the foreground until the filesystem is unmounted (ctrl-c or
//! `fusermount -u`).

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Arg, ArgAction, Command};
use fuser::{MountOption, Session};
use log::{error, info};

use sigfs::fuse::SignalFs;
use sigfs::{Config, FileSystem};

fn main() -> ExitCode {
    sigfs::logging::init();

    let matches = Command::new("sigfs")
        .version(sigfs::VERSION)
        .about("Mount a tree of broadcast signal files described by a JSON configuration")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .required(true)
                .help("JSON configuration file to load"),
        )
        .arg(
            Arg::new("mountpoint")
                .value_name("MOUNTPOINT")
                .required(true)
                .help("Directory to mount the signal filesystem on"),
        )
        .arg(
            Arg::new("options")
                .short('o')
                .long("options")
                .value_name("OPT[,OPT...]")
                .action(ArgAction::Append)
                .help("Mount options forwarded to the kernel filesystem (allow_other, allow_root, auto_unmount, ro, ...)"),
        )
        .arg(
            Arg::new("session-threads")
                .long("session-threads")
                .value_name("N")
                .help("Accepted for compatibility; blocking reads are served off the session loop regardless"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").unwrap();
    let mountpoint = matches.get_one::<String>("mountpoint").unwrap();

    let config = match Config::load(config_path) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}: {}", config_path, err);
            return ExitCode::from(2);
        }
    };

    let fsys = match FileSystem::from_config(&config) {
        Ok(fsys) => Arc::new(fsys),
        Err(err) => {
            eprintln!("{}: {}", config_path, err);
            return ExitCode::from(2);
        }
    };
    info!("loaded {} entries from {}", fsys.len(), config_path);

    let mut options = vec![MountOption::FSName("sigfs".to_string())];
    if let Some(values) = matches.get_many::<String>("options") {
        for value in values {
            for opt in value.split(',').filter(|o| !o.is_empty()) {
                options.push(parse_mount_option(opt));
            }
        }
    }

    let fs = SignalFs::new(fsys);
    let notifier_cell = fs.notifier_cell();

    let mut session = match Session::new(fs, mountpoint, &options) {
        Ok(session) => session,
        Err(err) => {
            error!("failed to mount on {}: {}", mountpoint, err);
            return ExitCode::FAILURE;
        }
    };
    let _ = notifier_cell.set(session.notifier());

    info!("serving signal files on {}", mountpoint);
    match session.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("session ended with error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn parse_mount_option(opt: &str) -> MountOption {
    match opt {
        "allow_other" => MountOption::AllowOther,
        "allow_root" => MountOption::AllowRoot,
        "auto_unmount" => MountOption::AutoUnmount,
        "default_permissions" => MountOption::DefaultPermissions,
        "dev" => MountOption::Dev,
        "nodev" => MountOption::NoDev,
        "suid" => MountOption::Suid,
        "nosuid" => MountOption::NoSuid,
        "ro" => MountOption::RO,
        "rw" => MountOption::RW,
        "exec" => MountOption::Exec,
        "noexec" => MountOption::NoExec,
        "atime" => MountOption::Atime,
        "noatime" => MountOption::NoAtime,
        "dirsync" => MountOption::DirSync,
        "sync" => MountOption::Sync,
        "async" => MountOption::Async,
        other => MountOption::CUSTOM(other.to_string()),
    }
}
