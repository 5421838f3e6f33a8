//! Resumable chunked transfer of a byte source to a non-blocking socket.
//!
//! A sender owns its byte source and a cursor marking how much of it has
//! actually been delivered. Each call to `send_next_chunk` attempts at most
//! one bounded write; on backpressure the cursor is left where it was so
//! the transfer resumes without duplicating or dropping bytes.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use bytes::Bytes;

/// Upper bound on the bytes attempted per `send_next_chunk` call.
pub const CHUNK_SIZE: usize = 4096;

/// Result of one send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// `n > 0` bytes were written; the cursor advanced by exactly `n`.
    /// The caller may try again immediately.
    Sent(usize),
    /// The destination's outbound buffer is full. Nothing was consumed;
    /// retry when the destination signals writability.
    WouldBlock,
    /// The cursor already equals the source length. Safe to call again;
    /// repeated calls keep returning `Done` without side effects.
    Done,
}

/// A byte source being streamed to a client: either an owned in-memory
/// buffer (command replies) or an open file (track content).
#[derive(Debug)]
pub enum ChunkSender {
    Memory(MemorySender),
    File(FileSender),
}

impl ChunkSender {
    pub fn send_next_chunk(&mut self, dest: &mut impl Write) -> io::Result<SendOutcome> {
        match self {
            ChunkSender::Memory(s) => s.send_next_chunk(dest),
            ChunkSender::File(s) => s.send_next_chunk(dest),
        }
    }
}

impl From<MemorySender> for ChunkSender {
    fn from(s: MemorySender) -> Self {
        ChunkSender::Memory(s)
    }
}

impl From<FileSender> for ChunkSender {
    fn from(s: FileSender) -> Self {
        ChunkSender::File(s)
    }
}

/// Streams an owned, immutable byte buffer.
#[derive(Debug)]
pub struct MemorySender {
    data: Bytes,
    cursor: usize,
}

impl MemorySender {
    /// Takes ownership of a private copy of the bytes to send; the
    /// caller's buffer may be transient.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            cursor: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes delivered so far.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn send_next_chunk(&mut self, dest: &mut impl Write) -> io::Result<SendOutcome> {
        let remaining = self.data.len() - self.cursor;
        if remaining == 0 {
            return Ok(SendOutcome::Done);
        }

        let end = self.cursor + remaining.min(CHUNK_SIZE);
        match write_chunk(dest, &self.data[self.cursor..end])? {
            Some(n) => {
                self.cursor += n;
                Ok(SendOutcome::Sent(n))
            }
            None => Ok(SendOutcome::WouldBlock),
        }
    }
}

/// Streams the contents of an open file.
///
/// The file's byte length is captured once at open time and not re-queried
/// per call. Because each attempt reads ahead into a scratch buffer, the
/// file's internal position can run past the cursor; it is re-seeked to
/// the cursor whenever the two diverge.
#[derive(Debug)]
pub struct FileSender {
    file: File,
    len: u64,
    cursor: u64,
}

impl FileSender {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            file,
            len,
            cursor: 0,
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes delivered so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn send_next_chunk(&mut self, dest: &mut impl Write) -> io::Result<SendOutcome> {
        let remaining = usize::try_from(self.len - self.cursor).unwrap_or(usize::MAX);
        if remaining == 0 {
            return Ok(SendOutcome::Done);
        }

        let want = remaining.min(CHUNK_SIZE);
        let mut chunk = [0u8; CHUNK_SIZE];
        let mut filled = 0;
        while filled < want {
            match self.file.read(&mut chunk[filled..want]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        if filled == 0 {
            // The file shrank underneath us; the captured length is stale.
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file truncated while streaming",
            ));
        }

        match write_chunk(dest, &chunk[..filled])? {
            Some(n) => {
                self.cursor += n as u64;
                if n < filled {
                    self.file.seek(SeekFrom::Start(self.cursor))?;
                }
                Ok(SendOutcome::Sent(n))
            }
            None => {
                // The read above advanced the file position past what was
                // actually sent; rewind to the cursor before retrying.
                self.file.seek(SeekFrom::Start(self.cursor))?;
                Ok(SendOutcome::WouldBlock)
            }
        }
    }
}

/// Writes one chunk, mapping backpressure to `None`.
fn write_chunk(dest: &mut impl Write, chunk: &[u8]) -> io::Result<Option<usize>> {
    loop {
        match dest.write(chunk) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "destination accepted zero bytes",
                ));
            }
            Ok(n) => return Ok(Some(n)),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}
