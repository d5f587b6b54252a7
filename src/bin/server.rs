use std::path::Path;
use std::process::ExitCode;

use rft::{serve_one_file, Config, UdpChannel};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let Some(port) = args.next().and_then(|p| p.parse::<u16>().ok()) else {
        eprintln!("usage: server <port>");
        return ExitCode::FAILURE;
    };

    let channel = match UdpChannel::bind(port) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let config = Config::default();
    println!(">>> Waiting for a client on port {port}...");

    match serve_one_file(&channel, Path::new("."), &config) {
        Ok(()) => {
            println!(">>> Transfer complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(">>> Transfer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
