//! # Rps Tournament
//!
//! A broker that pairs rock-paper-scissors agents into matches and keeps their results.
//!
//! It provides:
//! - A thread-safe bounded FIFO channel ([`BoundedChannel`](crate::channel::BoundedChannel)) that
//!   rejects writes when full and blocks readers until an element is available
//! - A dispatcher pairing waiting agents two by two, with monotonically increasing match ids
//! - One worker thread per participant per match, collecting that participant's reported result
//! - A result ledger whose per-player summary can be printed at any time without consuming it
//! - The player agent, which requests matches and plays them directly against its opponents
//!
//! Agents and broker talk over TCP with a line protocol, described in the [`protocol`] module.
//!
//! # Documentation Overview
//!
//! - For how the pieces are wired together, see the [`broker`] module.
//! - For the channel semantics (fail-fast writes, blocking reads, snapshots), see [`channel`].
//! - For pairing and match ids, see [`dispatcher`]; for result collection, see [`worker`].
//! - For the summary format, see [`ledger`].
//! - For configuring the broker, see [`BrokerConfig`](crate::configuration::BrokerConfig).
//!
//! # Usage Example
//!
//! Running a broker and two agents in the same process:
//!
//! ```no_run
//! use std::thread;
//! use rps_tournament::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let broker = Broker::bind(BrokerConfig::new().with_summary_on_hangup(false))?;
//!     let port = broker.local_addr()?.port();
//!     let ledger = broker.ledger();
//!     thread::spawn(move || broker.run());
//!
//!     let mut alice = Agent::new("alice", 3, port)?;
//!     let mut bob = Agent::new("bob", 3, port)?;
//!     let bob = thread::spawn(move || bob.run());
//!     for played in alice.run()? {
//!         println!("{played}");
//!     }
//!     bob.join().expect("bob panicked")?;
//!
//!     // Workers record results asynchronously
//!     thread::sleep(std::time::Duration::from_millis(100));
//!     ledger.summarize_and_print(&mut std::io::stdout())?;
//!     Ok(())
//! }
//! ```
//!
//! # Binaries
//!
//! - `rpsserver`: runs the broker, prints its port, and prints the summary on every `SIGHUP`.
//! - `rpsclient name matches port`: plays `matches` matches as `name` through the broker on
//!   `port`, then prints one `<id> <opponent> <WIN|LOSE|TIE>` line per match.
#![warn(missing_docs)]

pub use anyhow;
pub mod agent;
pub mod broker;
pub mod channel;
pub mod configuration;
pub mod connection;
pub mod dispatcher;
pub mod game;
pub mod ledger;
pub mod logger;
pub mod protocol;
mod signal;
mod tasks;
pub mod worker;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use rps_tournament::prelude::*;
/// ```
///
/// Includes:
/// - [`Broker`](crate::broker::Broker) and [`BrokerConfig`](crate::configuration::BrokerConfig)
/// - [`Agent`](crate::agent::Agent)
/// - [`BoundedChannel`](crate::channel::BoundedChannel)
/// - the ledger types
pub mod prelude {
    pub use crate::agent::{Agent, AgentError, PlayedMatch};
    pub use crate::broker::Broker;
    pub use crate::channel::BoundedChannel;
    pub use crate::configuration::BrokerConfig;
    pub use crate::connection::{Connection, TcpConnection};
    pub use crate::dispatcher::{MatchDispatcher, Request};
    pub use crate::ledger::{Outcome, PlayerSummary, ResultLedger, ResultRecord, SummaryRequest};
}
