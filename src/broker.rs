//! The broker process: accepts agents and wires the pipeline together.
//!
//! ```text
//!  agents --TCP--> accept loop --(one thread per connection)--> request channel
//!                                                                   |
//!                                                           MatchDispatcher
//!                                                                   |
//!                                          MatchWorker x2 per match --> ResultLedger
//!                                                                   |
//!                       SIGHUP --> summary request channel --> Summarizer --> stdout
//! ```
//!
//! A connection only becomes a request once its first line is a valid `MR` message. From then
//! on the connection belongs to the request, then to the worker serving that agent.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;

use anyhow::{anyhow, bail, Context};
use tracing::{debug, error, info, instrument, warn};

use crate::channel::BoundedChannel;
use crate::configuration::BrokerConfig;
use crate::connection::{Connection, TcpConnection};
use crate::dispatcher::{MatchDispatcher, Request};
use crate::ledger::{ResultLedger, Summarizer, SummaryRequest};
use crate::protocol::MatchRequest;
use crate::signal;
use crate::tasks::TaskSet;

/// Pending summary requests beyond this are dropped.
const SUMMARY_BACKLOG: usize = 16;

/// A bound, not yet running, broker.
pub struct Broker {
    listener: TcpListener,
    config: BrokerConfig,
    requests: Arc<BoundedChannel<Request<TcpConnection>>>,
    ledger: ResultLedger,
    summary_requests: Arc<BoundedChannel<SummaryRequest>>,
    hangup_forwarder: Option<JoinHandle<()>>,
}

impl Broker {
    /// Binds the listening socket on all interfaces and creates the channels.
    ///
    /// When [`BrokerConfig::with_summary_on_hangup`] is enabled, `SIGHUP` is blocked for the
    /// calling thread from here on and forwarded as a summary request. Call this before
    /// starting any other thread.
    #[instrument(skip_all, fields(port = config.port))]
    pub fn bind(config: BrokerConfig) -> anyhow::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port))
            .with_context(|| format!("could not listen on port {}", config.port))?;
        let summary_requests = Arc::new(BoundedChannel::new(SUMMARY_BACKLOG));

        let hangup_forwarder = if config.summary_on_hangup {
            signal::forward_hangups(summary_requests.clone())
                .context("could not set up SIGHUP forwarding")?
        } else {
            None
        };

        Ok(Self {
            listener,
            config,
            requests: Arc::new(BoundedChannel::new(config.request_capacity)),
            ledger: ResultLedger::new(config.result_capacity),
            summary_requests,
            hangup_forwarder,
        })
    }

    /// Address actually bound, useful when the configured port is `0`.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Handle on the results collected so far.
    pub fn ledger(&self) -> ResultLedger {
        self.ledger.clone()
    }

    /// Channel that triggers a summary on stdout for every request written to it.
    pub fn summary_requests(&self) -> Arc<BoundedChannel<SummaryRequest>> {
        self.summary_requests.clone()
    }

    /// Starts the summarizer and the dispatcher, then accepts agents forever.
    ///
    /// Only returns if the summarizer or the dispatcher cannot be started or stops.
    pub fn run(self) -> anyhow::Result<()> {
        let summarizer = Summarizer::new(
            self.ledger.clone(),
            self.summary_requests.clone(),
            io::stdout(),
        )
        .spawn()
        .context("could not start the summarizer")?;
        let dispatcher = MatchDispatcher::new(self.requests.clone(), self.ledger.channel().clone())
            .spawn()
            .context("could not start the dispatcher")?;
        info!(
            addr = ?self.listener.local_addr().ok(),
            config = ?self.config,
            hangup = self.hangup_forwarder.is_some(),
            "broker running"
        );

        let mut handlers = TaskSet::new();
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("could not accept connection: {e}");
                    continue;
                }
            };

            start_handler(stream, &self.requests, |name, handler| {
                handlers.spawn(name, handler)
            });

            for (name, result) in handlers.reap() {
                match result {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => debug!(handler = %name, "connection dropped: {e:#}"),
                    Err(_) => error!(handler = %name, "request handler panicked"),
                }
            }

            if summarizer.is_finished() || dispatcher.is_finished() {
                bail!("a broker thread stopped unexpectedly");
            }
        }

        Err(anyhow!("listener stopped accepting connections"))
    }
}

type Handler = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// Hands a new connection to its own request handler, started by `spawn`.
///
/// If the handler cannot be started, the connection is dropped and the broker carries on.
/// Returns whether the handler was started.
fn start_handler(
    stream: TcpStream,
    requests: &Arc<BoundedChannel<Request<TcpConnection>>>,
    spawn: impl FnOnce(String, Handler) -> io::Result<()>,
) -> bool {
    let name = match stream.peer_addr() {
        Ok(addr) => format!("request-{addr}"),
        Err(_) => "request".to_owned(),
    };
    let requests = requests.clone();
    let handler: Handler = Box::new(move || await_request(stream, &requests));

    match spawn(name.clone(), handler) {
        Ok(()) => true,
        Err(e) => {
            warn!(handler = %name, "could not start request handler, connection dropped: {e}");
            false
        }
    }
}

/// Reads the match request sent on a new connection and queues it for the dispatcher.
///
/// The connection is closed if the request is invalid or if the request channel is full.
fn await_request(
    stream: TcpStream,
    requests: &BoundedChannel<Request<TcpConnection>>,
) -> anyhow::Result<()> {
    let mut connection = TcpConnection::new(stream)?;
    let line = connection
        .recv_line()?
        .ok_or_else(|| anyhow!("closed before sending a request"))?;

    let request = match line.parse::<MatchRequest>() {
        Ok(request) => request,
        Err(e) => {
            let _ = connection.close();
            return Err(e.into());
        }
    };

    let name = request.name.clone();
    if let Err(full) = requests.write(request.into_request(connection)) {
        let capacity = full.capacity();
        let mut rejected = full.into_inner();
        let _ = rejected.connection.close();
        bail!("request channel full ({capacity} elements), request from {name} dropped");
    }
    debug!(player = %name, "request queued");
    Ok(())
}

#[cfg(test)]
mod broker_tests {
    use std::io::{BufRead, BufReader, Write};
    use std::net::Shutdown;
    use std::thread;

    use super::*;

    fn pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (server, _) = listener.accept().unwrap();
        (client, server)
    }

    #[test]
    fn valid_request_is_queued() {
        let requests = BoundedChannel::new(2);
        let (mut client, server) = pair();
        writeln!(client, "MR:alice:4000").unwrap();

        await_request(server, &requests).unwrap();
        let request = requests.read();
        assert_eq!(request.player_name, "alice");
        assert_eq!(request.address, "4000");
    }

    #[test]
    fn invalid_request_closes_connection() {
        let requests = BoundedChannel::new(2);
        let (mut client, server) = pair();
        writeln!(client, "HELLO").unwrap();

        assert!(await_request(server, &requests).is_err());
        assert!(requests.is_empty());

        let mut line = String::new();
        let read = BufReader::new(client).read_line(&mut line).unwrap();
        assert_eq!(read, 0, "connection should be closed");
    }

    #[test]
    fn closed_connection_is_not_a_request() {
        let requests = BoundedChannel::new(2);
        let (client, server) = pair();
        client.shutdown(Shutdown::Write).unwrap();

        assert!(await_request(server, &requests).is_err());
        assert!(requests.is_empty());
    }

    #[test]
    fn full_request_channel_drops_request() {
        let requests = BoundedChannel::new(0);
        let (mut client, server) = pair();
        writeln!(client, "MR:alice:4000").unwrap();

        let handler = thread::spawn(move || await_request(server, &requests));
        assert!(handler.join().unwrap().is_err());

        let mut line = String::new();
        assert_eq!(BufReader::new(client).read_line(&mut line).unwrap(), 0);
    }

    #[test]
    fn handler_start_failure_only_drops_that_connection() {
        let requests = Arc::new(BoundedChannel::new(2));
        let (client, server) = pair();
        let started = start_handler(server, &requests, |_, _| {
            Err(io::Error::from(io::ErrorKind::WouldBlock))
        });
        assert!(!started);
        let mut line = String::new();
        assert_eq!(BufReader::new(client).read_line(&mut line).unwrap(), 0);

        let mut handlers = TaskSet::new();
        let (mut client, server) = pair();
        writeln!(client, "MR:bob:5000").unwrap();
        assert!(start_handler(server, &requests, |name, handler| {
            handlers.spawn(name, handler)
        }));
        for (_, result) in handlers.join_all() {
            result.unwrap().unwrap();
        }
        assert_eq!(requests.read().player_name, "bob");
    }

    #[test]
    fn bind_on_ephemeral_port() {
        let broker = Broker::bind(BrokerConfig::new().with_summary_on_hangup(false)).unwrap();
        assert_ne!(broker.local_addr().unwrap().port(), 0);
        assert!(broker.ledger().is_empty());
        assert!(broker.summary_requests().is_empty());
    }
}
