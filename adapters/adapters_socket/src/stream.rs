//! Socket Stream Pairs
//!
//! Byte-stream objects attached to a registered socket descriptor: an input
//! stream always, and an output stream unless the descriptor is listening.
//! The two halves are closed independently. Whichever close clears the last
//! stream-presence flag from the handle registry also closes the OS
//! descriptor, so the descriptor is released exactly once no matter which
//! order the halves go away in.
//!
//! Closing the output half while the input half stays open performs a write
//! shutdown instead, so the peer observes end-of-file while the other
//! direction keeps working.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::net::Shutdown;
use std::sync::{Arc, OnceLock};

use entities_socket_state::{ClearOutcome, HandleTable, RoleFlags, SocketId};

use crate::error::SocketError;
use crate::tcp::{close_descriptor, with_socket};

fn trace_close() -> bool {
    static TRACE: OnceLock<bool> = OnceLock::new();
    *TRACE.get_or_init(|| std::env::var("SOCKET_TRACE_CLOSE").as_deref() == Ok("1"))
}

fn trace_close_failure(half: &str, id: SocketId, err: &SocketError) {
    if trace_close() {
        eprintln!("socket {}: releasing {} stream failed: {}", id, half, err);
    }
}

/// Clear the input-presence flag, closing the descriptor if it was the
/// last stream reference.
fn release_input(id: SocketId, table: &HandleTable) -> Result<(), SocketError> {
    match table.clear_role(id, RoleFlags::INPUT_STREAM) {
        ClearOutcome::Released => {
            close_descriptor(id).map_err(|e| SocketError::transport("close", e))
        }
        ClearOutcome::Retained => Ok(()),
    }
}

/// Clear the output-presence flag.
///
/// When the input half is still open this half-closes the connection so the
/// peer sees end-of-file; when this was the last stream reference the
/// descriptor is closed instead, which supersedes the half-close.
fn release_output(id: SocketId, table: &HandleTable) -> Result<(), SocketError> {
    if !table.contains(id) {
        // Descriptor already force-closed; nothing left to release.
        return Ok(());
    }

    // Shut down before clearing the flag: the output-presence flag pins the
    // record, so the descriptor is still alive for the shutdown call.
    let shutdown_result = with_socket(id, |socket| socket.shutdown(Shutdown::Write));

    match table.clear_role(id, RoleFlags::OUTPUT_STREAM) {
        ClearOutcome::Released => {
            close_descriptor(id).map_err(|e| SocketError::transport("close", e))
        }
        ClearOutcome::Retained => {
            shutdown_result.map_err(|e| SocketError::transport("shutdown", e))
        }
    }
}

/// Input half of a stream pair.
///
/// Reads delegate to the transport receive; a read of zero bytes means the
/// peer shut down its sending direction in an orderly fashion.
#[derive(Debug)]
pub struct InputStream {
    id: SocketId,
    table: Arc<HandleTable>,
    closed: bool,
}

impl InputStream {
    pub(crate) fn new(id: SocketId, table: Arc<HandleTable>) -> Self {
        Self {
            id,
            table,
            closed: false,
        }
    }

    /// Get the descriptor this stream is attached to
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Close the input half.
    ///
    /// Clears the input-presence flag; if the output half is already gone
    /// this closes the OS descriptor and reports the close outcome.
    /// Otherwise the close is pure bookkeeping with no OS-level effect.
    pub fn close(mut self) -> Result<(), SocketError> {
        self.closed = true;
        release_input(self.id, &self.table)
    }
}

impl Read for InputStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        with_socket(self.id, |socket| socket.read(buf))
    }
}

impl Seek for InputStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "socket streams do not support seeking",
        ))
    }
}

impl Drop for InputStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = release_input(self.id, &self.table) {
            trace_close_failure("input", self.id, &err);
        }
    }
}

/// Output half of a stream pair.
///
/// Writes delegate to the transport send; short writes are normal and the
/// caller decides whether to continue. Flushing is a no-op.
#[derive(Debug)]
pub struct OutputStream {
    id: SocketId,
    table: Arc<HandleTable>,
    closed: bool,
}

impl OutputStream {
    pub(crate) fn new(id: SocketId, table: Arc<HandleTable>) -> Self {
        Self {
            id,
            table,
            closed: false,
        }
    }

    /// Get the descriptor this stream is attached to
    pub fn id(&self) -> SocketId {
        self.id
    }

    /// Close the output half.
    ///
    /// If the input half is still open, the sending direction is shut down
    /// so the peer reads end-of-file. If this was the last stream reference
    /// the OS descriptor is closed and the close outcome reported.
    pub fn close(mut self) -> Result<(), SocketError> {
        self.closed = true;
        release_output(self.id, &self.table)
    }
}

impl Write for OutputStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        with_socket(self.id, |socket| socket.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for OutputStream {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "socket streams do not support seeking",
        ))
    }
}

impl Drop for OutputStream {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(err) = release_output(self.id, &self.table) {
            trace_close_failure("output", self.id, &err);
        }
    }
}
