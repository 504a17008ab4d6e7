//! Pairing of waiting agents into matches.
//!
//! The [`MatchDispatcher`] is the single consumer of the request channel. It takes requests two
//! at a time, gives each pair the next match id and starts one [`MatchWorker`] thread per
//! participant. It never waits for a match to finish before pairing the next one.
//!
//! The two reads of a pairing are not atomic: with an odd number of waiting agents, the
//! dispatcher holds the last request and waits until another one arrives.

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, instrument};

use crate::channel::BoundedChannel;
use crate::connection::Connection;
use crate::ledger::ResultRecord;
use crate::tasks::TaskSet;
use crate::worker::{MatchWorker, WorkerOutcome};

/// Match identifier, assigned by the dispatcher starting at 1.
pub type MatchId = u64;

/// An agent waiting to be paired.
#[derive(Debug)]
pub struct Request<C> {
    /// Player name.
    pub player_name: String,
    /// Where the agent waits for its opponent.
    pub address: String,
    /// Connection the request arrived on; the match assignment is sent back on it.
    pub connection: C,
}

/// Pairing notification sent to one participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchAssignment {
    /// Id shared by both participants of the match.
    pub match_id: MatchId,
    /// Name of the other participant.
    pub opponent_name: String,
    /// Where the other participant waits.
    pub opponent_address: String,
}

/// Consumes requests two at a time and launches the matches.
pub struct MatchDispatcher<C> {
    requests: Arc<BoundedChannel<Request<C>>>,
    results: Arc<BoundedChannel<ResultRecord>>,
    next_match_id: MatchId,
    workers: TaskSet<WorkerOutcome>,
}

impl<C: Connection> MatchDispatcher<C> {
    /// Creates a dispatcher reading `requests` and whose workers write to `results`.
    ///
    /// Only one dispatcher may read a given request channel.
    pub fn new(
        requests: Arc<BoundedChannel<Request<C>>>,
        results: Arc<BoundedChannel<ResultRecord>>,
    ) -> Self {
        Self {
            requests,
            results,
            next_match_id: 1,
            workers: TaskSet::new(),
        }
    }

    /// Waits for two requests, pairs them and starts their workers.
    ///
    /// Returns the id given to the match.
    ///
    /// Finished workers are reaped (and their outcome logged) each time a request is read, so
    /// the last workers of an idle broker stay unreaped until the next agent shows up.
    #[instrument(skip_all)]
    pub fn dispatch_next(&mut self) -> MatchId {
        let first = self.requests.read();
        self.reap_finished_workers();
        debug!(player = %first.player_name, "waiting for an opponent");
        let second = self.requests.read();
        self.reap_finished_workers();

        let match_id = self.next_match_id;
        self.next_match_id += 1;
        info!(
            match_id,
            first = %first.player_name,
            second = %second.player_name,
            "match paired"
        );

        let first_assignment = MatchAssignment {
            match_id,
            opponent_name: second.player_name.clone(),
            opponent_address: second.address.clone(),
        };
        let second_assignment = MatchAssignment {
            match_id,
            opponent_name: first.player_name.clone(),
            opponent_address: first.address.clone(),
        };

        self.launch(MatchWorker::new(first, first_assignment, self.results.clone()));
        self.launch(MatchWorker::new(second, second_assignment, self.results.clone()));

        match_id
    }

    /// Pairs requests forever.
    pub fn run(mut self) {
        loop {
            self.dispatch_next();
        }
    }

    /// Runs the dispatcher on its own thread.
    pub fn spawn(self) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("dispatcher".to_owned())
            .spawn(move || self.run())
    }

    /// Workers started and not reaped yet.
    pub fn active_workers(&self) -> usize {
        self.workers.len()
    }

    /// Blocks until every started worker finished, and returns how they ended.
    pub fn wait_for_workers(&mut self) -> Vec<WorkerOutcome> {
        self.workers
            .join_all()
            .into_iter()
            .filter_map(|(name, result)| match result {
                Ok(outcome) => Some(outcome),
                Err(_) => {
                    error!(worker = %name, "worker panicked");
                    None
                }
            })
            .collect()
    }

    fn launch(&mut self, worker: MatchWorker<C>) {
        let name = format!(
            "match-{}-{}",
            worker.assignment().match_id,
            worker.player_name()
        );
        if let Err(e) = self.workers.spawn(name.clone(), move || worker.run()) {
            // the worker (and its connection) is dropped with the closure
            error!(worker = %name, "could not start worker: {e}");
        }
    }

    fn reap_finished_workers(&mut self) {
        for (name, result) in self.workers.reap() {
            match result {
                Ok(outcome) => debug!(worker = %name, ?outcome, "worker finished"),
                Err(_) => error!(worker = %name, "worker panicked"),
            }
        }
    }
}
