//! One side of one match.
//!
//! A [`MatchWorker`] tells its agent who to play, then waits for the agent to report how the
//! match went and records that report. The two workers of a match never talk to each other;
//! the agents play directly against each other in between.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use tracing::{debug, info, instrument, warn};

use crate::channel::BoundedChannel;
use crate::connection::Connection;
use crate::dispatcher::{MatchAssignment, Request};
use crate::ledger::ResultRecord;
use crate::protocol::{ResultReport, ServerMessage};

/// How a worker ended.
#[derive(Debug)]
pub enum WorkerOutcome {
    /// The agent's result was added to the ledger.
    Recorded(ResultRecord),
    /// The agent reported, but the results channel was full and the record was dropped.
    Dropped(ResultRecord),
    /// No result was obtained (connection lost, malformed report, ...).
    Abandoned(anyhow::Error),
}

/// Drives one participant through one match.
pub struct MatchWorker<C> {
    player_name: String,
    assignment: MatchAssignment,
    connection: C,
    results: Arc<BoundedChannel<ResultRecord>>,
}

impl<C: Connection> MatchWorker<C> {
    /// Creates the worker for the agent behind `request`.
    pub fn new(
        request: Request<C>,
        assignment: MatchAssignment,
        results: Arc<BoundedChannel<ResultRecord>>,
    ) -> Self {
        Self {
            player_name: request.player_name,
            assignment,
            connection: request.connection,
            results,
        }
    }

    /// Name of the agent this worker serves.
    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    /// The assignment this worker delivers.
    pub fn assignment(&self) -> &MatchAssignment {
        &self.assignment
    }

    /// Runs the whole lifecycle and closes the connection.
    ///
    /// Blocks until the agent reports or disconnects; there is no timeout.
    #[instrument(skip_all, fields(match_id = self.assignment.match_id, player = %self.player_name))]
    pub fn run(mut self) -> WorkerOutcome {
        let outcome = match self.collect_result() {
            Ok(record) => match self.results.write(record.clone()) {
                Ok(()) => {
                    info!(outcome = %record.outcome, "result recorded");
                    WorkerOutcome::Recorded(record)
                }
                Err(full) => {
                    warn!("{full}, result dropped");
                    WorkerOutcome::Dropped(full.into_inner())
                }
            },
            Err(e) => {
                warn!("no result: {e:#}");
                WorkerOutcome::Abandoned(e)
            }
        };

        if let Err(e) = self.connection.close() {
            debug!("closing connection: {e}");
        }
        outcome
    }

    fn collect_result(&mut self) -> anyhow::Result<ResultRecord> {
        let announcement = ServerMessage::Match(self.assignment.clone()).to_string();
        self.connection
            .send_line(&announcement)
            .context("could not send match assignment")?;

        let line = self
            .connection
            .recv_line()
            .context("could not read result")?
            .ok_or_else(|| anyhow!("connection closed before the result was reported"))?;
        let report: ResultReport = line.parse()?;
        if report.match_id != self.assignment.match_id {
            warn!(reported = report.match_id, "result reported for another match id");
        }

        Ok(ResultRecord::new(
            self.player_name.clone(),
            report.outcome_for(&self.player_name),
        ))
    }
}
