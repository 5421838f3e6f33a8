//! Wire protocol for the jukebox control connection.
//!
//! Clients speak newline-terminated ASCII command lines. Replies are
//! unframed byte streams terminated by a half-close of the connection's
//! write side; there is no length field, so several replies cannot be
//! pipelined on one connection. That limitation is part of the protocol,
//! not something the server papers over.
//!
//! Commands (case-insensitive, first whitespace-separated token):
//!
//! | command | argument | effect                                 |
//! |---------|----------|----------------------------------------|
//! | `list`  | none     | one line per track, `(index)\tname`    |
//! | `info`  | index    | descriptive text for the track         |
//! | `play`  | index    | stream the track's bytes               |
//! | `stop`  | none     | abort the current streaming reply      |
//! | `close` | none     | terminate the connection               |

/// Reply sent when a command names an index outside the catalog, or the
/// index argument is missing or not a base-10 integer.
pub const NO_SUCH_TRACK: &str = "no such track\n";

/// Reply sent when a catalogued track's file cannot be opened.
pub const TRACK_UNAVAILABLE: &str = "track unavailable\n";

/// A parsed command line.
///
/// `Info` and `Play` carry `None` when the index argument is missing or
/// malformed; callers treat that exactly like an out-of-range index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Info(Option<usize>),
    Play(Option<usize>),
    Stop,
    Close,
    Unknown(String),
}

/// Parses one command line (without its trailing newline).
pub fn parse_command(line: &str) -> Command {
    let line = line.to_ascii_lowercase();
    let mut tokens = line.split_whitespace();

    match tokens.next() {
        Some("list") => Command::List,
        Some("info") => Command::Info(parse_index(tokens.next())),
        Some("play") => Command::Play(parse_index(tokens.next())),
        Some("stop") => Command::Stop,
        Some("close") => Command::Close,
        Some(other) => Command::Unknown(other.to_string()),
        None => Command::Unknown(String::new()),
    }
}

fn parse_index(token: Option<&str>) -> Option<usize> {
    token.and_then(|t| t.parse::<usize>().ok())
}
