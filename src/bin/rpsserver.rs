//! Tournament broker.
//!
//! Takes no arguments. Prints the port it listens on, then the results summary every time it
//! receives `SIGHUP`. See [`BrokerConfig::from_env`] for the environment variables it reads.

use std::env;
use std::io::{self, Write};
use std::process::ExitCode;

use rps_tournament::logger::init_logger;
use rps_tournament::prelude::*;

const INCORRECT_ARG_COUNT: u8 = 1;
const BIND_FAILED: u8 = 3;

fn main() -> ExitCode {
    if env::args().len() != 1 {
        eprintln!("Usage: rpsserver");
        return ExitCode::from(INCORRECT_ARG_COUNT);
    }

    let config = BrokerConfig::from_env();
    if config.log() {
        if let Err(e) = init_logger("rpsserver") {
            eprintln!("{e:#}");
        }
    }

    let broker = match Broker::bind(config) {
        Ok(broker) => broker,
        Err(e) => {
            eprintln!("{e:#}");
            return ExitCode::from(BIND_FAILED);
        }
    };
    let port = match broker.local_addr() {
        Ok(addr) => addr.port(),
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(BIND_FAILED);
        }
    };

    let mut stdout = io::stdout().lock();
    if writeln!(stdout, "{port}").and_then(|_| stdout.flush()).is_err() {
        return ExitCode::FAILURE;
    }
    drop(stdout);

    match broker.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
