//! Sample subscriber
//!
//! Reads framed signal records from a mounted signal file and prints one
//! `id, signals-lost, size, data` line per signal.

use std::fs::File;
use std::io::Read;
use std::process::ExitCode;

use clap::{Arg, ArgAction, Command};

fn main() -> ExitCode {
    sigfs::logging::init();

    let matches = Command::new("sigfs-subscribe")
        .version(sigfs::VERSION)
        .about("Subscribe to signals from a signal file")
        .arg(
            Arg::new("file")
                .short('f')
                .long("file")
                .value_name("FILE")
                .required(true)
                .help("The signal file to subscribe from"),
        )
        .arg(
            Arg::new("count")
                .short('c')
                .long("count")
                .value_name("COUNT")
                .default_value("0")
                .value_parser(clap::value_parser!(u64))
                .help("Number of signals to read before exiting; 0 means forever"),
        )
        .arg(
            Arg::new("hex")
                .short('x')
                .long("hex")
                .action(ArgAction::SetTrue)
                .help("Print data in hex; default is escaped strings"),
        )
        .get_matches();

    let path = matches.get_one::<String>("file").unwrap();
    let count = *matches.get_one::<u64>("count").unwrap();
    let hex = matches.get_flag("hex");

    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) => {
            eprintln!("Could not open {} for reading: {}", path, err);
            return ExitCode::FAILURE;
        }
    };

    if count > 0 {
        println!("Reading {} signals. Ctrl-c to abort", count);
    } else {
        println!("Reading signals. Ctrl-c to abort");
    }
    println!("id, signals-lost, size, data");

    let mut buf = vec![0u8; 65536];
    let mut seen = 0u64;

    while count == 0 || seen < count {
        let read_len = match file.read(&mut buf) {
            Ok(0) => break,
            Ok(len) => len,
            Err(err) => {
                eprintln!("Failed to read from {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        };

        for record in sigfs::wire::SignalStream::new(&buf[..read_len]) {
            let record = match record {
                Ok(record) => record,
                Err(err) => {
                    eprintln!("Malformed signal stream: {}", err);
                    return ExitCode::FAILURE;
                }
            };

            let rendered = if hex {
                hex_string(record.payload)
            } else {
                escape_string(record.payload)
            };
            println!(
                "{}, {}, {}, \"{}\"",
                record.signal_id,
                record.lost_signals,
                record.payload.len(),
                rendered
            );
            seen += 1;
        }
    }

    ExitCode::SUCCESS
}

fn escape_string(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &byte in data {
        match byte {
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b'\t' => out.push_str("\\t"),
            byte if byte.is_ascii_graphic() || byte == b' ' => out.push(byte as char),
            byte => out.push_str(&format!("\\{:03}", byte)),
        }
    }
    out
}

fn hex_string(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{:02X}", byte)).collect()
}
