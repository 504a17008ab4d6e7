//! Rock-paper-scissors rules, as played between two agents.

use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::ledger::Outcome;
use crate::protocol::ProtocolError;

/// Rounds always played before a leader can win the match.
pub const MIN_ROUNDS: u32 = 5;
/// After this many rounds without a decision, the match is a tie.
pub const MAX_ROUNDS: u32 = 20;

/// A single throw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Move {
    /// Beats scissors.
    Rock,
    /// Beats rock.
    Paper,
    /// Beats paper.
    Scissors,
}

impl Move {
    const ALL: [Move; 3] = [Move::Rock, Move::Paper, Move::Scissors];

    /// Uniformly random move.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Move {
        Move::ALL[rng.gen_range(0..Move::ALL.len())]
    }

    /// Outcome of playing `self` against `other`, from the point of view of `self`.
    pub fn against(self, other: Move) -> Outcome {
        use Move::*;
        match (self, other) {
            (Rock, Scissors) | (Paper, Rock) | (Scissors, Paper) => Outcome::Win,
            (Rock, Paper) | (Paper, Scissors) | (Scissors, Rock) => Outcome::Lose,
            _ => Outcome::Tie,
        }
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Move::Rock => "ROCK",
            Move::Paper => "PAPER",
            Move::Scissors => "SCISSORS",
        };
        f.write_str(s)
    }
}

impl FromStr for Move {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROCK" => Ok(Move::Rock),
            "PAPER" => Ok(Move::Paper),
            "SCISSORS" => Ok(Move::Scissors),
            other => Err(ProtocolError::UnknownMove(other.to_owned())),
        }
    }
}

/// Running score of one match, from one player's side.
///
/// The first time a player leads after [`MIN_ROUNDS`] rounds, the match is decided. Both
/// players see the same rounds, so both reach the same decision at the same round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchScore {
    rounds: u32,
    player: u32,
    opponent: u32,
}

impl MatchScore {
    /// Score before the first round.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one round and returns the match outcome once it is decided.
    pub fn record(&mut self, round: Outcome) -> Option<Outcome> {
        self.rounds += 1;
        match round {
            Outcome::Win => self.player += 1,
            Outcome::Lose => self.opponent += 1,
            Outcome::Tie => {}
        }

        if self.rounds >= MIN_ROUNDS && self.player != self.opponent {
            Some(if self.player > self.opponent {
                Outcome::Win
            } else {
                Outcome::Lose
            })
        } else if self.rounds >= MAX_ROUNDS {
            Some(Outcome::Tie)
        } else {
            None
        }
    }

    /// Rounds played so far.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}

#[cfg(test)]
mod game_tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn rules() {
        assert_eq!(Move::Rock.against(Move::Scissors), Outcome::Win);
        assert_eq!(Move::Scissors.against(Move::Paper), Outcome::Win);
        assert_eq!(Move::Paper.against(Move::Rock), Outcome::Win);
        assert_eq!(Move::Rock.against(Move::Paper), Outcome::Lose);
        for m in Move::ALL {
            assert_eq!(m.against(m), Outcome::Tie);
        }
    }

    #[test]
    fn rules_are_symmetric() {
        for a in Move::ALL {
            for b in Move::ALL {
                let mirrored = match a.against(b) {
                    Outcome::Win => Outcome::Lose,
                    Outcome::Lose => Outcome::Win,
                    Outcome::Tie => Outcome::Tie,
                };
                assert_eq!(b.against(a), mirrored);
            }
        }
    }

    #[test]
    fn lead_before_min_rounds_does_not_decide() {
        let mut score = MatchScore::new();
        for _ in 0..MIN_ROUNDS - 1 {
            assert_eq!(score.record(Outcome::Win), None);
        }
        assert_eq!(score.record(Outcome::Tie), Some(Outcome::Win));
        assert_eq!(score.rounds(), MIN_ROUNDS);
    }

    #[test]
    fn even_score_keeps_playing() {
        let mut score = MatchScore::new();
        for _ in 0..2 {
            assert_eq!(score.record(Outcome::Win), None);
            assert_eq!(score.record(Outcome::Lose), None);
        }
        assert_eq!(score.record(Outcome::Tie), None);
        assert_eq!(score.record(Outcome::Lose), Some(Outcome::Lose));
        assert_eq!(score.rounds(), 6);
    }

    #[test]
    fn tie_after_max_rounds() {
        let mut score = MatchScore::new();
        for _ in 0..MAX_ROUNDS - 1 {
            assert_eq!(score.record(Outcome::Tie), None);
        }
        assert_eq!(score.record(Outcome::Tie), Some(Outcome::Tie));
    }

    #[test]
    fn random_moves_cover_all() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut seen = [false; 3];
        for _ in 0..100 {
            let m = Move::random(&mut rng);
            seen[Move::ALL.iter().position(|x| *x == m).unwrap()] = true;
        }
        assert_eq!(seen, [true; 3]);
    }
}
