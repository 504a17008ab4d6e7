//! Player agent: asks the broker for matches and plays them against other agents.
//!
//! For every match, the agent
//! 1. connects to the broker and sends `MR:<name>:<port>`, where `port` is its own listener;
//! 2. waits for `MATCH:<id>:<opponent>:<opponent port>`;
//! 3. connects to the opponent's listener and accepts the opponent on its own, then sends its
//!    moves on the outgoing connection and reads the opponent's on the incoming one;
//! 4. reports `RESULT:<id>:<winner or TIE>` to the broker.
//!
//! Moves come from a generator seeded with the sum of the bytes of the agent's name, so an
//! agent always plays the same sequence of moves.

use std::fmt;
use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info, instrument};

use crate::connection::{Connection, TcpConnection};
use crate::dispatcher::{MatchAssignment, MatchId};
use crate::game::{MatchScore, Move};
use crate::ledger::Outcome;
use crate::protocol::{MatchRequest, MoveMessage, ResultReport, ServerMessage};

/// Pause between two matches of the same agent.
pub const MATCH_PAUSE: Duration = Duration::from_millis(50);

/// Names an agent may not use, as they would be ambiguous in a result report.
const RESERVED_NAMES: [&str; 2] = ["TIE", "ERROR"];

/// Errors that end an agent, each with its own exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AgentError {
    /// Name is empty, not alphanumeric, reserved, or refused by the broker.
    #[error("Invalid name")]
    InvalidName,
    /// Match count is not a positive integer.
    #[error("Invalid match count")]
    InvalidMatchCount,
    /// The broker (or an opponent) cannot be reached.
    #[error("Invalid port number")]
    InvalidPort,
}

impl AgentError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            AgentError::InvalidName => 2,
            AgentError::InvalidMatchCount => 3,
            AgentError::InvalidPort => 4,
        }
    }
}

/// Checks that `name` can be used as a player name.
pub fn validate_name(name: &str) -> Result<(), AgentError> {
    if name.is_empty()
        || !name.bytes().all(|b| b.is_ascii_alphanumeric())
        || RESERVED_NAMES.contains(&name)
    {
        return Err(AgentError::InvalidName);
    }
    Ok(())
}

/// Parses the number of matches to play.
pub fn parse_match_count(value: &str) -> Result<usize, AgentError> {
    match value.parse() {
        Ok(count) if count > 0 => Ok(count),
        _ => Err(AgentError::InvalidMatchCount),
    }
}

/// Parses the broker port.
pub fn parse_port(value: &str) -> Result<u16, AgentError> {
    match value.parse() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(AgentError::InvalidPort),
    }
}

/// One finished match, from the agent's side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMatch {
    /// Id given by the broker.
    pub match_id: MatchId,
    /// Name of the opponent.
    pub opponent: String,
    /// How the match ended for this agent.
    pub outcome: Outcome,
}

impl fmt::Display for PlayedMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.match_id, self.opponent, self.outcome)
    }
}

/// A player taking part in the tournament.
pub struct Agent {
    name: String,
    matches: usize,
    broker: SocketAddr,
    listener: TcpListener,
    rng: ChaCha8Rng,
}

impl Agent {
    /// Creates an agent that will play `matches` matches through the broker on `broker_port`
    /// of this host, and starts listening for opponents.
    pub fn new(name: &str, matches: usize, broker_port: u16) -> Result<Self, AgentError> {
        validate_name(name)?;
        if matches == 0 {
            return Err(AgentError::InvalidMatchCount);
        }
        let listener =
            TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).map_err(|_| AgentError::InvalidPort)?;
        let seed = name.bytes().map(u64::from).sum();

        Ok(Self {
            name: name.to_owned(),
            matches,
            broker: (Ipv4Addr::LOCALHOST, broker_port).into(),
            listener,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Player name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Port opponents connect to.
    pub fn port(&self) -> io::Result<u16> {
        Ok(self.listener.local_addr()?.port())
    }

    /// Plays every match, one after the other.
    ///
    /// Stops at the first match that cannot be played. Errors caused by a refused name or an
    /// unreachable broker carry an [`AgentError`].
    #[instrument(skip_all, fields(agent = %self.name))]
    pub fn run(&mut self) -> anyhow::Result<Vec<PlayedMatch>> {
        let mut played = Vec::with_capacity(self.matches);
        for i in 0..self.matches {
            if i > 0 {
                thread::sleep(MATCH_PAUSE);
            }
            let result = self.play_next()?;
            info!(
                match_id = result.match_id,
                opponent = %result.opponent,
                outcome = %result.outcome,
                "match played"
            );
            played.push(result);
        }
        Ok(played)
    }

    /// Asks the broker for a match, plays it and reports the result.
    pub fn play_next(&mut self) -> anyhow::Result<PlayedMatch> {
        let mut broker = TcpConnection::connect(self.broker)
            .map_err(|e| anyhow!(e).context(AgentError::InvalidPort))?;

        let request = MatchRequest {
            name: self.name.clone(),
            address: self.port()?.to_string(),
        };
        broker.send_line(&request.to_string())?;

        let line = broker
            .recv_line()?
            .ok_or_else(|| anyhow!("broker closed the connection before pairing"))?;
        let assignment = match line.parse::<ServerMessage>()? {
            ServerMessage::Match(assignment) => assignment,
            ServerMessage::BadName => return Err(AgentError::InvalidName.into()),
        };
        debug!(?assignment, "paired");

        let outcome = self.play_against(&assignment)?;
        let report = ResultReport::new(
            assignment.match_id,
            &self.name,
            &assignment.opponent_name,
            outcome,
        );
        broker.send_line(&report.to_string())?;
        broker.close()?;

        Ok(PlayedMatch {
            match_id: assignment.match_id,
            opponent: assignment.opponent_name,
            outcome,
        })
    }

    /// Plays rounds against the assigned opponent until the match is decided.
    pub fn play_against(&mut self, assignment: &MatchAssignment) -> anyhow::Result<Outcome> {
        let opponent_addr = resolve(&assignment.opponent_address)?;
        let mut outgoing = TcpConnection::connect(opponent_addr)
            .map_err(|e| anyhow!(e).context(AgentError::InvalidPort))?;
        let (stream, _) = self
            .listener
            .accept()
            .context("could not accept the opponent")?;
        let mut incoming = TcpConnection::new(stream)?;

        let mut score = MatchScore::new();
        let outcome = loop {
            let mine = Move::random(&mut self.rng);
            outgoing.send_line(&MoveMessage(mine).to_string())?;

            let line = incoming
                .recv_line()?
                .ok_or_else(|| anyhow!("{} left the match", assignment.opponent_name))?;
            let MoveMessage(theirs) = line.parse::<MoveMessage>()?;

            if let Some(outcome) = score.record(mine.against(theirs)) {
                break outcome;
            }
        };
        debug!(rounds = score.rounds(), %outcome, "match decided");

        let _ = outgoing.close();
        let _ = incoming.close();
        Ok(outcome)
    }
}

/// A bare port means the opponent runs on this host.
fn resolve(address: &str) -> anyhow::Result<SocketAddr> {
    if let Ok(port) = address.parse::<u16>() {
        return Ok((Ipv4Addr::LOCALHOST, port).into());
    }
    address
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| anyhow!(AgentError::InvalidPort))
}

#[cfg(test)]
mod agent_tests {
    use std::io::{BufRead, BufReader, Write};

    use super::*;

    #[test]
    fn names() {
        assert_eq!(validate_name("alice42"), Ok(()));
        for bad in ["", "TIE", "ERROR", "al ice", "bob:1", "élise"] {
            assert_eq!(validate_name(bad), Err(AgentError::InvalidName), "{bad:?}");
        }
        assert_eq!(validate_name("tie"), Ok(()));
    }

    #[test]
    fn match_counts() {
        assert_eq!(parse_match_count("3"), Ok(3));
        for bad in ["0", "-1", "three", ""] {
            assert_eq!(parse_match_count(bad), Err(AgentError::InvalidMatchCount));
        }
    }

    #[test]
    fn exit_codes() {
        assert_eq!(AgentError::InvalidName.exit_code(), 2);
        assert_eq!(AgentError::InvalidMatchCount.exit_code(), 3);
        assert_eq!(AgentError::InvalidPort.exit_code(), 4);
        assert_eq!(parse_port("0"), Err(AgentError::InvalidPort));
        assert_eq!(parse_port("8080"), Ok(8080));
    }

    #[test]
    fn played_match_line() {
        let played = PlayedMatch {
            match_id: 4,
            opponent: "bob".to_owned(),
            outcome: Outcome::Tie,
        };
        assert_eq!(played.to_string(), "4 bob TIE");
    }

    #[test]
    fn both_sides_agree_on_the_outcome() {
        let mut alice = Agent::new("alice", 1, 1).unwrap();
        let mut bob = Agent::new("bob", 1, 1).unwrap();
        let to_alice = MatchAssignment {
            match_id: 1,
            opponent_name: "bob".to_owned(),
            opponent_address: bob.port().unwrap().to_string(),
        };
        let to_bob = MatchAssignment {
            match_id: 1,
            opponent_name: "alice".to_owned(),
            opponent_address: alice.port().unwrap().to_string(),
        };

        let bob_side = thread::spawn(move || bob.play_against(&to_bob).unwrap());
        let alice_outcome = alice.play_against(&to_alice).unwrap();
        let bob_outcome = bob_side.join().unwrap();

        let expected = match alice_outcome {
            Outcome::Win => Outcome::Lose,
            Outcome::Lose => Outcome::Win,
            Outcome::Tie => Outcome::Tie,
        };
        assert_eq!(bob_outcome, expected);
    }

    #[test]
    fn refused_name() {
        let broker = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = broker.local_addr().unwrap().port();
        let fake_broker = thread::spawn(move || {
            let (mut stream, _) = broker.accept().unwrap();
            let mut line = String::new();
            BufReader::new(stream.try_clone().unwrap())
                .read_line(&mut line)
                .unwrap();
            writeln!(stream, "BADNAME").unwrap();
            line
        });

        let mut agent = Agent::new("alice", 1, port).unwrap();
        let err = agent.run().unwrap_err();
        assert_eq!(err.downcast_ref::<AgentError>(), Some(&AgentError::InvalidName));

        let request = fake_broker.join().unwrap();
        assert_eq!(request, format!("MR:alice:{}\n", agent.port().unwrap()));
    }

    #[test]
    fn unreachable_broker() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let mut agent = Agent::new("alice", 1, port).unwrap();
        let err = agent.run().unwrap_err();
        assert_eq!(err.downcast_ref::<AgentError>(), Some(&AgentError::InvalidPort));
    }

    #[test]
    fn invalid_arguments() {
        assert_eq!(Agent::new("TIE", 1, 1).err(), Some(AgentError::InvalidName));
        assert_eq!(Agent::new("alice", 0, 1).err(), Some(AgentError::InvalidMatchCount));
    }
}
