//! Match results and their on-demand summary.
//!
//! Every finished match side is appended to the results [`BoundedChannel`] by its worker as a
//! [`ResultRecord`]. Records are never consumed: [`ResultLedger::summarize_and_print`] walks the
//! queued records under the channel lock and recomputes every [`PlayerSummary`] from scratch,
//! so a summary can be requested at any time without disturbing the accounting.
//!
//! Summaries are requested through a [`SummaryRequest`] channel served by a [`Summarizer`]
//! thread. Whatever triggers the request (an operator signal, a test) never touches the ledger
//! itself.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, instrument};

use crate::channel::{BoundedChannel, Full};

/// Outcome of one match from the point of view of one participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The participant won.
    Win,
    /// The participant lost.
    Lose,
    /// Nobody won.
    Tie,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Outcome::Win => "WIN",
            Outcome::Lose => "LOSE",
            Outcome::Tie => "TIE",
        };
        f.write_str(s)
    }
}

/// One participant's reported outcome for one match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    /// The reporting player.
    pub player_name: String,
    /// What happened to that player.
    pub outcome: Outcome,
}

impl ResultRecord {
    /// Creates a record for `player_name`.
    pub fn new(player_name: impl Into<String>, outcome: Outcome) -> Self {
        Self {
            player_name: player_name.into(),
            outcome,
        }
    }
}

/// Aggregated results of one player.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerSummary {
    /// Player name, unique within a summary.
    pub name: String,
    /// Number of wins.
    pub wins: u32,
    /// Number of losses.
    pub losses: u32,
    /// Number of ties.
    pub ties: u32,
}

impl PlayerSummary {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ..Default::default()
        }
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Lose => self.losses += 1,
            Outcome::Tie => self.ties += 1,
        }
    }

    /// Total number of recorded matches.
    pub fn played(&self) -> u32 {
        self.wins + self.losses + self.ties
    }
}

impl fmt::Display for PlayerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.name, self.wins, self.losses, self.ties)
    }
}

/// Line printed after every summary.
pub const SUMMARY_TERMINATOR: &str = "---";

/// Shared handle on the results channel.
///
/// Cloning is cheap: every clone refers to the same channel.
#[derive(Debug, Clone)]
pub struct ResultLedger {
    results: Arc<BoundedChannel<ResultRecord>>,
}

impl ResultLedger {
    /// Creates a ledger backed by a new channel of `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self::from_channel(Arc::new(BoundedChannel::new(capacity)))
    }

    /// Wraps an existing results channel.
    pub fn from_channel(results: Arc<BoundedChannel<ResultRecord>>) -> Self {
        Self { results }
    }

    /// The channel workers append their records to.
    pub fn channel(&self) -> &Arc<BoundedChannel<ResultRecord>> {
        &self.results
    }

    /// Appends a record.
    ///
    /// # Errors
    /// Fails when the ledger is full; the record is given back inside [`Full`].
    pub fn record(&self, record: ResultRecord) -> Result<(), Full<ResultRecord>> {
        self.results.write(record)
    }

    /// Number of records so far.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Per-player totals, sorted by name.
    pub fn summarize(&self) -> Vec<PlayerSummary> {
        summarize_records(self.results.snapshot().iter())
    }

    /// Writes one `name wins losses ties` line per player, sorted by name, then `---`.
    ///
    /// The channel stays locked until everything is written, so the printed summary is
    /// consistent; workers trying to record a result wait meanwhile.
    #[instrument(skip_all)]
    pub fn summarize_and_print<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let snapshot = self.results.snapshot();
        let summaries = summarize_records(snapshot.iter());
        debug!(records = snapshot.len(), players = summaries.len());

        for summary in &summaries {
            writeln!(out, "{summary}")?;
        }
        writeln!(out, "{SUMMARY_TERMINATOR}")?;
        out.flush()
    }

    /// Same as [`summarize_and_print`](Self::summarize_and_print), into a `String`.
    pub fn render(&self) -> String {
        let mut rendered = summarize_records(self.results.snapshot().iter())
            .iter()
            .map(|summary| format!("{summary}\n"))
            .collect::<String>();
        rendered.push_str(SUMMARY_TERMINATOR);
        rendered.push('\n');
        rendered
    }
}

fn summarize_records<'a>(records: impl Iterator<Item = &'a ResultRecord>) -> Vec<PlayerSummary> {
    // String ordering is byte-wise, hence case-sensitive
    let mut players: BTreeMap<&str, PlayerSummary> = BTreeMap::new();
    for record in records {
        players
            .entry(record.player_name.as_str())
            .or_insert_with(|| PlayerSummary::new(&record.player_name))
            .record(record.outcome);
    }
    players.into_values().collect()
}

/// Request for the [`Summarizer`] to print the current standings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryRequest;

/// Serves [`SummaryRequest`]s by printing the ledger summary to `out`.
pub struct Summarizer<W> {
    ledger: ResultLedger,
    requests: Arc<BoundedChannel<SummaryRequest>>,
    out: W,
}

impl<W: Write> Summarizer<W> {
    /// Creates a summarizer printing `ledger` to `out` for every request read from `requests`.
    pub fn new(
        ledger: ResultLedger,
        requests: Arc<BoundedChannel<SummaryRequest>>,
        out: W,
    ) -> Self {
        Self {
            ledger,
            requests,
            out,
        }
    }

    /// Waits for the next request and prints one summary.
    pub fn serve_next(&mut self) -> io::Result<()> {
        self.requests.read();
        self.ledger.summarize_and_print(&mut self.out)
    }

    /// Where summaries are written.
    pub fn output(&self) -> &W {
        &self.out
    }

    /// Serves requests forever.
    pub fn run(mut self) {
        loop {
            if let Err(e) = self.serve_next() {
                error!("could not print summary: {e}");
            }
        }
    }
}

impl<W: Write + Send + 'static> Summarizer<W> {
    /// Runs the summarizer on its own thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("summarizer".to_owned())
            .spawn(move || self.run())
    }
}
