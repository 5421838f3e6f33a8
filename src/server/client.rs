use std::io::Read;
use std::net::{Shutdown, SocketAddr};

use mio::Token;
use mio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::protocol::{self, Command};
use crate::sender::{ChunkSender, FileSender, MemorySender, SendOutcome};
use crate::server::poller::{Interest, Poller, PollerError};

/// Longest command line accepted before the connection is considered
/// misbehaving.
const MAX_LINE: usize = 1024;

pub enum ClientState {
    /// Waiting for a command line.
    Receiving,
    /// A partially-sent reply is parked on the connection, waiting for
    /// write-readiness.
    Sending(ChunkSender),
}

/// What the event loop should do with the connection after a handler ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepOpen,
    Close,
}

/// One connected client and its protocol state.
pub struct Client {
    stream: TcpStream,
    token: Token,
    peer: SocketAddr,
    state: ClientState,
    inbuf: Vec<u8>,
}

impl Client {
    pub fn new(stream: TcpStream, token: Token, peer: SocketAddr) -> Self {
        Self {
            stream,
            token,
            peer,
            state: ClientState::Receiving,
            inbuf: Vec::with_capacity(256),
        }
    }

    pub fn token(&self) -> Token {
        self.token
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn is_sending(&self) -> bool {
        matches!(self.state, ClientState::Sending(_))
    }

    /// Stops monitoring this connection. The socket itself closes when the
    /// client is dropped.
    pub fn deregister(&mut self, poller: &mut Poller) -> Result<(), PollerError> {
        poller.remove(&mut self.stream, self.token)
    }

    /// Handles read-readiness: drains the socket, then runs every complete
    /// command line that has arrived.
    pub fn handle_readable(
        &mut self,
        poller: &mut Poller,
        catalog: &Catalog,
    ) -> anyhow::Result<Disposition> {
        let mut peer_closed = false;
        let mut buf = [0u8; 1024];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => {
                    self.inbuf.extend_from_slice(&buf[..n]);
                    if self.inbuf.len() > MAX_LINE && !self.inbuf.contains(&b'\n') {
                        warn!(peer = %self.peer, "command line too long; closing connection");
                        return Ok(Disposition::Close);
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        while let Some(line) = take_line(&mut self.inbuf) {
            debug!(peer = %self.peer, "received command: {line}");
            if self.apply_command(protocol::parse_command(&line), poller, catalog)?
                == Disposition::Close
            {
                return Ok(Disposition::Close);
            }
        }

        if self.inbuf.len() > MAX_LINE {
            warn!(peer = %self.peer, "command line too long; closing connection");
            return Ok(Disposition::Close);
        }

        if peer_closed {
            info!(peer = %self.peer, "peer closed the connection");
            return Ok(Disposition::Close);
        }

        Ok(Disposition::KeepOpen)
    }

    /// Handles write-readiness: resumes the parked reply until it drains
    /// or the socket buffer fills again.
    pub fn handle_writable(&mut self, poller: &mut Poller) -> anyhow::Result<Disposition> {
        let mut total = 0usize;
        let done = match &mut self.state {
            ClientState::Receiving => {
                debug!(peer = %self.peer, "write readiness with no reply in progress");
                return Ok(Disposition::KeepOpen);
            }
            ClientState::Sending(sender) => {
                let mut done = false;
                loop {
                    match sender.send_next_chunk(&mut self.stream)? {
                        SendOutcome::Sent(n) => total += n,
                        SendOutcome::WouldBlock => break,
                        SendOutcome::Done => {
                            done = true;
                            break;
                        }
                    }
                }
                done
            }
        };

        debug!(peer = %self.peer, sent = total, "resumed reply");
        if done {
            self.finish_response(poller)?;
        }
        Ok(Disposition::KeepOpen)
    }

    fn apply_command(
        &mut self,
        command: Command,
        poller: &mut Poller,
        catalog: &Catalog,
    ) -> anyhow::Result<Disposition> {
        match command {
            Command::List => {
                self.send_text(poller, catalog.listing())?;
            }
            Command::Info(index) => match index.and_then(|i| catalog.get(i)) {
                Some(track) => self.send_text(poller, track.info_text())?,
                None => {
                    warn!(peer = %self.peer, "info request for unknown track {index:?}");
                    self.send_text(poller, protocol::NO_SUCH_TRACK.to_string())?;
                }
            },
            Command::Play(index) => match index.and_then(|i| catalog.get(i)) {
                Some(track) => match FileSender::open(track.path()) {
                    Ok(sender) => {
                        info!(peer = %self.peer, track = track.name(), "streaming track");
                        self.begin_response(poller, sender.into())?;
                    }
                    Err(e) => {
                        warn!(peer = %self.peer, track = track.name(), "failed to open track: {e}");
                        self.send_text(poller, protocol::TRACK_UNAVAILABLE.to_string())?;
                    }
                },
                None => {
                    warn!(peer = %self.peer, "play request for unknown track {index:?}");
                    self.send_text(poller, protocol::NO_SUCH_TRACK.to_string())?;
                }
            },
            Command::Stop => self.stop_response(poller)?,
            Command::Close => {
                info!(peer = %self.peer, "close requested");
                return Ok(Disposition::Close);
            }
            Command::Unknown(word) => {
                warn!(peer = %self.peer, "unknown command: {word:?}");
            }
        }
        Ok(Disposition::KeepOpen)
    }

    fn send_text(&mut self, poller: &mut Poller, text: String) -> anyhow::Result<()> {
        self.begin_response(poller, MemorySender::new(text.into_bytes()).into())
    }

    /// Starts a reply, draining as much as the socket accepts right away.
    /// On backpressure the sender is parked and write interest added; a
    /// reply that completes immediately never registers write interest.
    fn begin_response(&mut self, poller: &mut Poller, mut sender: ChunkSender) -> anyhow::Result<()> {
        if self.is_sending() {
            // A new command supersedes the reply in flight.
            self.state = ClientState::Receiving;
            poller.modify(&mut self.stream, self.token, Interest::Readable)?;
        }

        let mut total = 0usize;
        loop {
            match sender.send_next_chunk(&mut self.stream)? {
                SendOutcome::Sent(n) => total += n,
                SendOutcome::WouldBlock => {
                    debug!(peer = %self.peer, sent = total, "reply backpressured; waiting for writability");
                    self.state = ClientState::Sending(sender);
                    poller.modify(&mut self.stream, self.token, Interest::ReadableWritable)?;
                    return Ok(());
                }
                SendOutcome::Done => {
                    debug!(peer = %self.peer, sent = total, "reply complete");
                    return self.finish_response(poller);
                }
            }
        }
    }

    /// Ends the current reply: drops any sender, reverts to read-only
    /// interest, and half-closes the write side toward the client. The
    /// half-close is the end-of-reply signal, since the protocol carries
    /// no length framing.
    fn finish_response(&mut self, poller: &mut Poller) -> anyhow::Result<()> {
        if poller.interest(self.token) == Some(Interest::ReadableWritable) {
            poller.modify(&mut self.stream, self.token, Interest::Readable)?;
        }
        self.state = ClientState::Receiving;
        if let Err(e) = self.stream.shutdown(Shutdown::Write) {
            debug!(peer = %self.peer, "write-side shutdown failed: {e}");
        }
        Ok(())
    }

    fn stop_response(&mut self, poller: &mut Poller) -> anyhow::Result<()> {
        if self.is_sending() {
            info!(peer = %self.peer, "stopping reply in progress");
            self.finish_response(poller)
        } else {
            debug!(peer = %self.peer, "stop with no reply in progress");
            Ok(())
        }
    }
}

/// Removes and returns the first complete line from `buf`, stripping the
/// line terminator.
fn take_line(buf: &mut Vec<u8>) -> Option<String> {
    let pos = buf.iter().position(|&b| b == b'\n')?;
    let raw: Vec<u8> = buf.drain(..=pos).collect();
    let mut line = String::from_utf8_lossy(&raw).into_owned();
    while line.ends_with('\n') || line.ends_with('\r') {
        line.pop();
    }
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_line_strips_terminator() {
        let mut buf = b"play 2\r\nlist\n".to_vec();
        assert_eq!(take_line(&mut buf).unwrap(), "play 2");
        assert_eq!(take_line(&mut buf).unwrap(), "list");
        assert!(take_line(&mut buf).is_none());
    }

    #[test]
    fn take_line_waits_for_newline() {
        let mut buf = b"pla".to_vec();
        assert!(take_line(&mut buf).is_none());
        assert_eq!(buf, b"pla");
    }
}
