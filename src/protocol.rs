//! Text line protocol spoken between agents and the broker.
//!
//! Every message is a single line of `:`-separated fields, starting with a tag:
//!
//! | direction        | message                                  |
//! |------------------|------------------------------------------|
//! | agent -> broker  | `MR:<name>:<port>`                       |
//! | broker -> agent  | `MATCH:<id>:<opponent name>:<opponent port>` or `BADNAME` |
//! | agent -> broker  | `RESULT:<id>:<winner name or TIE>`       |
//! | agent -> agent   | `MOVE:<ROCK, PAPER or SCISSORS>`         |
//!
//! Each message type implements [`FromStr`] and [`Display`](fmt::Display) so that
//! `msg.to_string().parse()` gives the message back.

use std::fmt;
use std::str::FromStr;

use crate::dispatcher::{MatchAssignment, MatchId, Request};
use crate::game::Move;
use crate::ledger::Outcome;

const REQUEST_TAG: &str = "MR:";
const MATCH_TAG: &str = "MATCH:";
const RESULT_TAG: &str = "RESULT:";
const MOVE_TAG: &str = "MOVE:";
const BAD_NAME: &str = "BADNAME";
const TIE: &str = "TIE";

/// Error raised when a line cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The line does not start with the expected tag.
    #[error("expected a {expected} message, got {line:?}")]
    UnexpectedMessage {
        /// Tag that was expected.
        expected: &'static str,
        /// Offending line.
        line: String,
    },
    /// The tag is right but the fields are not.
    #[error("malformed {kind} message: {line:?}")]
    Malformed {
        /// Tag of the message.
        kind: &'static str,
        /// Offending line.
        line: String,
    },
    /// Not one of `ROCK`, `PAPER`, `SCISSORS`.
    #[error("unknown move {0:?}")]
    UnknownMove(String),
}

fn fields<'a>(
    line: &'a str,
    tag: &'static str,
    count: usize,
) -> Result<Vec<&'a str>, ProtocolError> {
    let kind = tag.trim_end_matches(':');
    let body = line
        .strip_prefix(tag)
        .ok_or_else(|| ProtocolError::UnexpectedMessage {
            expected: kind,
            line: line.to_owned(),
        })?;
    let fields: Vec<_> = body.split(':').collect();
    if fields.len() != count || fields.iter().any(|f| f.is_empty()) {
        return Err(ProtocolError::Malformed {
            kind,
            line: line.to_owned(),
        });
    }
    Ok(fields)
}

fn parse_match_id(field: &str, kind: &'static str, line: &str) -> Result<MatchId, ProtocolError> {
    field.parse().map_err(|_| ProtocolError::Malformed {
        kind,
        line: line.to_owned(),
    })
}

/// An agent asking to be paired: `MR:<name>:<port>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRequest {
    /// Player name.
    pub name: String,
    /// Where the agent waits for its opponent (a port on the agent's host).
    pub address: String,
}

impl MatchRequest {
    /// Attaches the connection the request arrived on.
    pub fn into_request<C>(self, connection: C) -> Request<C> {
        Request {
            player_name: self.name,
            address: self.address,
            connection,
        }
    }
}

impl FromStr for MatchRequest {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = fields(line, REQUEST_TAG, 2)?;
        Ok(MatchRequest {
            name: fields[0].to_owned(),
            address: fields[1].to_owned(),
        })
    }
}

impl fmt::Display for MatchRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{REQUEST_TAG}{}:{}", self.name, self.address)
    }
}

impl FromStr for MatchAssignment {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = fields(line, MATCH_TAG, 3)?;
        Ok(MatchAssignment {
            match_id: parse_match_id(fields[0], "MATCH", line)?,
            opponent_name: fields[1].to_owned(),
            opponent_address: fields[2].to_owned(),
        })
    }
}

impl fmt::Display for MatchAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{MATCH_TAG}{}:{}:{}",
            self.match_id, self.opponent_name, self.opponent_address
        )
    }
}

/// What an agent may receive after sending its [`MatchRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// The agent was paired.
    Match(MatchAssignment),
    /// The requested name was refused.
    BadName,
}

impl FromStr for ServerMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        if line == BAD_NAME {
            return Ok(ServerMessage::BadName);
        }
        line.parse().map(ServerMessage::Match)
    }
}

impl fmt::Display for ServerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerMessage::Match(assignment) => write!(f, "{assignment}"),
            ServerMessage::BadName => f.write_str(BAD_NAME),
        }
    }
}

/// Who won a match, as reported by an agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Winner {
    /// The named player won.
    Player(String),
    /// Nobody won.
    Tie,
}

impl fmt::Display for Winner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Winner::Player(name) => f.write_str(name),
            Winner::Tie => f.write_str(TIE),
        }
    }
}

/// An agent's report at the end of a match: `RESULT:<id>:<winner or TIE>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultReport {
    /// Match being reported.
    pub match_id: MatchId,
    /// Reported winner.
    pub winner: Winner,
}

impl ResultReport {
    /// Report sent by `player` after getting `outcome` against `opponent`.
    pub fn new(match_id: MatchId, player: &str, opponent: &str, outcome: Outcome) -> Self {
        let winner = match outcome {
            Outcome::Win => Winner::Player(player.to_owned()),
            Outcome::Lose => Winner::Player(opponent.to_owned()),
            Outcome::Tie => Winner::Tie,
        };
        Self { match_id, winner }
    }

    /// Reads the report from the point of view of `player`.
    ///
    /// Any winner other than `player` counts as a loss for `player`.
    pub fn outcome_for(&self, player: &str) -> Outcome {
        match &self.winner {
            Winner::Tie => Outcome::Tie,
            Winner::Player(name) if name == player => Outcome::Win,
            Winner::Player(_) => Outcome::Lose,
        }
    }
}

impl FromStr for ResultReport {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = fields(line, RESULT_TAG, 2)?;
        let winner = match fields[1] {
            TIE => Winner::Tie,
            name => Winner::Player(name.to_owned()),
        };
        Ok(ResultReport {
            match_id: parse_match_id(fields[0], "RESULT", line)?,
            winner,
        })
    }
}

impl fmt::Display for ResultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{RESULT_TAG}{}:{}", self.match_id, self.winner)
    }
}

/// One move sent to the opponent: `MOVE:<move>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveMessage(pub Move);

impl FromStr for MoveMessage {
    type Err = ProtocolError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields = fields(line, MOVE_TAG, 1)?;
        fields[0].parse().map(MoveMessage)
    }
}

impl fmt::Display for MoveMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{MOVE_TAG}{}", self.0)
    }
}
