//! Tournament player.
//!
//! Usage: `rpsclient name matches port`. Plays `matches` matches as `name` through the broker
//! listening on `port` of this host, then prints one `<id> <opponent> <WIN|LOSE|TIE>` line per
//! match. Set `RPS_LOG=true` to log to a file.

use std::env;
use std::process::ExitCode;

use rps_tournament::agent::{self, Agent, AgentError, PlayedMatch};
use rps_tournament::configuration::BrokerConfig;
use rps_tournament::logger::init_logger;

const INCORRECT_ARG_COUNT: u8 = 1;
const UNSPECIFIED: u8 = 5;

fn play(name: &str, matches: &str, port: &str) -> anyhow::Result<Vec<PlayedMatch>> {
    agent::validate_name(name)?;
    let matches = agent::parse_match_count(matches)?;
    let port = agent::parse_port(port)?;
    Ok(Agent::new(name, matches, port)?.run()?)
}

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let [name, matches, port] = args.as_slice() else {
        eprintln!("Usage: rpsclient name matches port");
        return ExitCode::from(INCORRECT_ARG_COUNT);
    };

    if BrokerConfig::from_env().log() {
        if let Err(e) = init_logger("rpsclient") {
            eprintln!("{e:#}");
        }
    }

    match play(name, matches, port) {
        Ok(played) => {
            for m in played {
                println!("{m}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("{e:#}");
            match e.downcast_ref::<AgentError>() {
                Some(err) => {
                    eprintln!("{err}");
                    ExitCode::from(err.exit_code())
                }
                None => ExitCode::from(UNSPECIFIED),
            }
        }
    }
}
