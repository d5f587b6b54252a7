use std::path::Path;
use std::process::ExitCode;

use rft::{fetch_one_file, Config, UdpChannel};

fn main() -> ExitCode {
    let mut args = std::env::args().skip(1);
    let (Some(host), Some(port), Some(filename)) = (
        args.next(),
        args.next().and_then(|p| p.parse::<u16>().ok()),
        args.next(),
    ) else {
        eprintln!("usage: client <server-host> <port> <filename>");
        return ExitCode::FAILURE;
    };

    let (channel, server) = match UdpChannel::connect((host.as_str(), port)) {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let config = Config::default();
    println!(">>> Requesting {filename:?} from {server}...");

    match fetch_one_file(&channel, server, &filename, Path::new("received.data"), &config) {
        Ok(()) => {
            println!(">>> Wrote received.data");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!(">>> Transfer failed: {e}");
            ExitCode::FAILURE
        }
    }
}
