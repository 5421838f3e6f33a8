//! The serving engine.
//!
//! A single thread drives every connection. The only place the engine
//! blocks is the poller's wait call; all socket and file operations on the
//! hot path are non-blocking or bounded, so one slow client can never
//! stall the others.
//!
//! # Connection State Machine
//!
//! Each client connection moves between two states:
//!
//! ```text
//!        ┌─────────────┐
//!        │  Receiving  │ ← Wait for a command line
//!        └──────┬──────┘
//!               │ Reply does not fit the socket buffer
//!               ▼
//!        ┌──────────────────┐
//!        │     Sending      │ ← Resume the reply on write-readiness
//!        └──────┬───────────┘
//!               │ Reply drained (or `stop`)
//!               ├─ Half-close write side → Receiving
//!               └─ `close` / transport error → connection destroyed
//! ```
//!
//! A reply that fits the socket buffer in one go never leaves `Receiving`
//! and never registers write interest. Write interest exists exactly while
//! a partially-sent reply is parked on the connection.

pub mod client;
pub mod event_loop;
pub mod poller;

pub use client::{Client, ClientState, Disposition};
pub use event_loop::EventLoop;
pub use poller::{Interest, Poller, PollerError, Readiness};
