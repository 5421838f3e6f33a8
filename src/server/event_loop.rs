use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use mio::Token;
use mio::net::TcpListener;
use tracing::{info, warn};

use crate::catalog::Catalog;
use crate::server::client::{Client, Disposition};
use crate::server::poller::{Interest, Poller, Readiness};

const LISTENER: Token = Token(0);

/// The serving loop: owns the poller, the listener, the catalog, and the
/// registry of live connections. Everything here runs on one thread.
pub struct EventLoop {
    poller: Poller,
    listener: TcpListener,
    clients: HashMap<Token, Client>,
    catalog: Catalog,
    next_token: usize,
}

impl EventLoop {
    pub fn bind(addr: &str, catalog: Catalog) -> anyhow::Result<Self> {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("invalid listen address {addr}"))?;
        let mut listener = TcpListener::bind(addr)?;
        let mut poller = Poller::new()?;
        poller.register(&mut listener, LISTENER, Interest::Readable)?;

        Ok(Self {
            poller,
            listener,
            clients: HashMap::new(),
            catalog,
            next_token: 1,
        })
    }

    /// The address the listener actually bound to. Useful when binding to
    /// port 0.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_count(&self) -> usize {
        self.clients.len()
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        loop {
            self.poll_once(None)?;
        }
    }

    /// One turn of the loop: wait for readiness, then handle every event
    /// reported, in order. Per-connection failures are contained here;
    /// only a failure of the wait itself is fatal.
    pub fn poll_once(&mut self, timeout: Option<Duration>) -> anyhow::Result<()> {
        let events = self.poller.wait(timeout)?;
        for event in events {
            if event.token == LISTENER {
                self.accept_pending();
            } else {
                self.drive_client(event);
            }
        }
        Ok(())
    }

    fn accept_pending(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, peer)) => {
                    let token = Token(self.next_token);
                    self.next_token += 1;
                    if let Err(e) = self.poller.register(&mut stream, token, Interest::Readable) {
                        warn!("failed to register connection from {peer}: {e}");
                        continue;
                    }
                    info!("accepted connection from {peer}");
                    self.clients.insert(token, Client::new(stream, token, peer));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn drive_client(&mut self, event: Readiness) {
        let Self {
            poller,
            clients,
            catalog,
            ..
        } = self;

        let Some(client) = clients.get_mut(&event.token) else {
            // Stale event for a connection closed earlier this turn.
            return;
        };

        let mut disposition = Disposition::KeepOpen;
        if event.readable {
            disposition = match client.handle_readable(poller, catalog) {
                Ok(d) => d,
                Err(e) => {
                    warn!(peer = %client.peer(), "read handling failed: {e}");
                    Disposition::Close
                }
            };
        }
        if disposition == Disposition::KeepOpen && event.writable {
            disposition = match client.handle_writable(poller) {
                Ok(d) => d,
                Err(e) => {
                    warn!(peer = %client.peer(), "write handling failed: {e}");
                    Disposition::Close
                }
            };
        }

        if disposition == Disposition::Close {
            if let Some(mut client) = clients.remove(&event.token) {
                if let Err(e) = client.deregister(poller) {
                    warn!(peer = %client.peer(), "deregister failed: {e}");
                }
                info!(peer = %client.peer(), "connection closed");
                // Dropping the client closes its socket and releases any
                // sender it still held.
            }
        }
    }
}
