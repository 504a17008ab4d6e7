//! Line-oriented connections to agents.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};

use tracing::trace;

/// A bidirectional, line-oriented byte stream to one agent.
///
/// This is the only view the broker has of the transport: it sends lines, receives lines and
/// closes the connection.
pub trait Connection: Send + 'static {
    /// Sends `line`, followed by a newline.
    fn send_line(&mut self, line: &str) -> io::Result<()>;

    /// Blocks until a full line is received. The line terminator is stripped.
    ///
    /// Returns `Ok(None)` once the peer closed the stream.
    fn recv_line(&mut self) -> io::Result<Option<String>>;

    /// Closes both directions of the connection.
    fn close(&mut self) -> io::Result<()>;
}

/// A [`Connection`] over TCP.
#[derive(Debug)]
pub struct TcpConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TcpConnection {
    /// Wraps an accepted or connected stream.
    pub fn new(stream: TcpStream) -> io::Result<Self> {
        let writer = stream.try_clone()?;
        Ok(Self {
            reader: BufReader::new(stream),
            writer,
        })
    }

    /// Connects to `addr`.
    pub fn connect(addr: impl ToSocketAddrs) -> io::Result<Self> {
        Self::new(TcpStream::connect(addr)?)
    }

    /// Address of the remote end.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.writer.peer_addr()
    }
}

impl Connection for TcpConnection {
    fn send_line(&mut self, line: &str) -> io::Result<()> {
        trace!(line = %line, "send");
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()
    }

    fn recv_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        trace!(line = %line, "recv");
        Ok(Some(line))
    }

    fn close(&mut self) -> io::Result<()> {
        match self.writer.shutdown(Shutdown::Both) {
            // peer went first
            Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(()),
            res => res,
        }
    }
}

/// In-memory connection replaying scripted lines, for unit tests.
#[cfg(test)]
pub(crate) mod scripted {
    use std::collections::VecDeque;
    use std::io;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    use super::Connection;

    #[derive(Debug, Clone, Default)]
    pub struct Transcript {
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl Transcript {
        pub fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        pub fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    #[derive(Debug)]
    pub struct ScriptedConnection {
        incoming: VecDeque<String>,
        transcript: Transcript,
    }

    impl ScriptedConnection {
        /// Once `incoming` is exhausted, the connection reads as closed.
        pub fn new(incoming: &[&str]) -> (Self, Transcript) {
            let transcript = Transcript::default();
            let connection = Self {
                incoming: incoming.iter().map(|l| l.to_string()).collect(),
                transcript: transcript.clone(),
            };
            (connection, transcript)
        }
    }

    impl Connection for ScriptedConnection {
        fn send_line(&mut self, line: &str) -> io::Result<()> {
            if self.transcript.is_closed() {
                return Err(io::ErrorKind::BrokenPipe.into());
            }
            self.transcript.sent.lock().unwrap().push(line.to_owned());
            Ok(())
        }

        fn recv_line(&mut self) -> io::Result<Option<String>> {
            Ok(self.incoming.pop_front())
        }

        fn close(&mut self) -> io::Result<()> {
            self.transcript.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }
}
