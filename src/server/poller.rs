//! Readiness multiplexer.
//!
//! Thin wrapper over `mio::Poll` that tracks which tokens are registered
//! and what interest each carries, so connection-state transitions never
//! touch the OS event machinery directly. `mio` reports readiness
//! edge-style; callers must drain available data or capacity on every
//! event (loop until `WouldBlock`) rather than handle a fixed amount.

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Poll, Token};
use thiserror::Error;

/// What a handle is monitored for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
    ReadableWritable,
}

impl Interest {
    fn to_mio(self) -> mio::Interest {
        match self {
            Interest::Readable => mio::Interest::READABLE,
            Interest::Writable => mio::Interest::WRITABLE,
            Interest::ReadableWritable => mio::Interest::READABLE | mio::Interest::WRITABLE,
        }
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("token {0:?} is already registered")]
    AlreadyRegistered(Token),
    #[error("token {0:?} is not registered")]
    NotRegistered(Token),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One ready handle, as reported by `wait`.
#[derive(Debug, Clone, Copy)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
}

pub struct Poller {
    poll: Poll,
    events: Events,
    registered: HashMap<Token, Interest>,
}

impl Poller {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(256),
            registered: HashMap::new(),
        })
    }

    /// Begins monitoring `source` under `token`.
    pub fn register<S: Source>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), PollerError> {
        if self.registered.contains_key(&token) {
            return Err(PollerError::AlreadyRegistered(token));
        }
        self.poll
            .registry()
            .register(source, token, interest.to_mio())?;
        self.registered.insert(token, interest);
        Ok(())
    }

    /// Replaces the interest set of an already-registered handle.
    pub fn modify<S: Source>(
        &mut self,
        source: &mut S,
        token: Token,
        interest: Interest,
    ) -> Result<(), PollerError> {
        if !self.registered.contains_key(&token) {
            return Err(PollerError::NotRegistered(token));
        }
        self.poll
            .registry()
            .reregister(source, token, interest.to_mio())?;
        self.registered.insert(token, interest);
        Ok(())
    }

    /// Stops monitoring a handle. Does not close it.
    pub fn remove<S: Source>(&mut self, source: &mut S, token: Token) -> Result<(), PollerError> {
        if self.registered.remove(&token).is_none() {
            return Err(PollerError::NotRegistered(token));
        }
        self.poll.registry().deregister(source)?;
        Ok(())
    }

    /// The interest a token is currently registered with, if any.
    pub fn interest(&self, token: Token) -> Option<Interest> {
        self.registered.get(&token).copied()
    }

    /// Blocks until at least one registered handle is ready, or `timeout`
    /// elapses. With no timeout this loops over spurious empty wakeups and
    /// only returns once an event exists; it is the engine's sole
    /// suspension point.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<Vec<Readiness>> {
        loop {
            match self.poll.poll(&mut self.events, timeout) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }

            let ready: Vec<Readiness> = self
                .events
                .iter()
                .map(|event| Readiness {
                    token: event.token(),
                    readable: event.is_readable() || event.is_read_closed(),
                    writable: event.is_writable(),
                })
                .collect();

            if !ready.is_empty() || timeout.is_some() {
                return Ok(ready);
            }
        }
    }
}
