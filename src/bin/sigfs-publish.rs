//! Sample publisher
//!
//! Writes framed payload records to a mounted signal file. `%d` in the data
//! string is replaced by the 1-based send counter.

use std::fs::OpenOptions;
use std::io::Write;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Arg, Command};

fn main() -> ExitCode {
    sigfs::logging::init();

    let matches = Command::new("sigfs-publish")
        .version(sigfs::VERSION)
        .about("Publish signals to a signal file")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .required(true)
                .help("The signal file to publish to"),
        )
        .arg(
            Arg::new("data")
                .short('d')
                .long("data")
                .value_name("DATA")
                .required(true)
                .help("Data to publish; \"%d\" is replaced with the counter"),
        )
        .arg(
            Arg::new("count")
                .short('c')
                .long("count")
                .value_name("COUNT")
                .default_value("1")
                .value_parser(clap::value_parser!(u64))
                .help("How many signals to send"),
        )
        .arg(
            Arg::new("sleep")
                .short('s')
                .long("sleep")
                .value_name("USEC")
                .default_value("0")
                .value_parser(clap::value_parser!(u64))
                .help("Microseconds to sleep between sends"),
        )
        .get_matches();

    let path = matches.get_one::<String>("file").unwrap();
    let data = matches.get_one::<String>("data").unwrap();
    let count = *matches.get_one::<u64>("count").unwrap();
    let sleep_usec = *matches.get_one::<u64>("sleep").unwrap();

    let mut file = match OpenOptions::new().write(true).open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Could not open {} for writing: {}", path, err);
            return ExitCode::FAILURE;
        }
    };

    let mut buf = Vec::new();
    for counter in 1..=count {
        let payload = data.replace("%d", &counter.to_string());

        buf.clear();
        sigfs::wire::encode_payload(&mut buf, payload.as_bytes());
        if let Err(err) = file.write_all(&buf) {
            eprintln!("Failed to write to {}: {}", path, err);
            return ExitCode::FAILURE;
        }

        if sleep_usec > 0 {
            std::thread::sleep(Duration::from_micros(sleep_usec));
        }
    }

    ExitCode::SUCCESS
}
