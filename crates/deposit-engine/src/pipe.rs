//! The bounded in-memory pipe the Streaming Assembler (C3, §4.3) uses to
//! decouple its producer from the transport's consumer: "a bounded buffer
//! (≈1 MiB)... the consumer reads the read end."

use std::io::{self, Read, Write};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};

/// Target buffer budget (§4.3, §5). The channel's slot count is derived
/// from this divided by the writer's chunk size rather than being a raw
/// byte count, since `std::sync::mpsc` is capacity-in-items, not bytes.
pub const PIPE_BUFFER_BUDGET_BYTES: usize = 1024 * 1024;
const CHUNK_SIZE: usize = 64 * 1024;

enum Frame {
    Chunk(Vec<u8>),
    Err(String),
}

pub fn bounded_pipe() -> (PipeWriter, PipeReader) {
    let capacity = (PIPE_BUFFER_BUDGET_BYTES / CHUNK_SIZE).max(1);
    let (tx, rx) = sync_channel(capacity);
    (PipeWriter { tx }, PipeReader { rx, leftover: Vec::new(), poisoned: false })
}

pub struct PipeWriter {
    tx: SyncSender<Frame>,
}

impl Write for PipeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(Frame::Chunk(buf.to_vec()))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl PipeWriter {
    /// Close the pipe with a recorded cause (§4.3 "Failure model"): the
    /// consumer's next read surfaces a wrapped error carrying this cause.
    pub fn close_with_error(self, cause: impl Into<String>) {
        let _ = self.tx.send(Frame::Err(cause.into()));
    }
}

pub struct PipeReader {
    rx: Receiver<Frame>,
    leftover: Vec<u8>,
    poisoned: bool,
}

impl Read for PipeReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.poisoned {
            return Err(io::Error::new(io::ErrorKind::Other, "assembler pipe already failed"));
        }
        while self.leftover.is_empty() {
            match self.rx.recv() {
                Ok(Frame::Chunk(bytes)) => self.leftover = bytes,
                Ok(Frame::Err(cause)) => {
                    self.poisoned = true;
                    return Err(io::Error::new(io::ErrorKind::Other, cause));
                }
                Err(_) => return Ok(0), // producer dropped the writer cleanly: EOF
            }
        }
        let n = buf.len().min(self.leftover.len());
        buf[..n].copy_from_slice(&self.leftover[..n]);
        self.leftover.drain(..n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read as _;
    use std::thread;

    #[test]
    fn roundtrips_bytes_through_the_pipe() {
        let (mut writer, mut reader) = bounded_pipe();
        let handle = thread::spawn(move || {
            writer.write_all(b"hello, pipe").unwrap();
        });
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        handle.join().unwrap();
        assert_eq!(out, b"hello, pipe");
    }

    #[test]
    fn error_closes_surface_on_next_read() {
        let (writer, mut reader) = bounded_pipe();
        let handle = thread::spawn(move || {
            writer.close_with_error("custodial source read failed");
        });
        let mut buf = [0u8; 16];
        let err = reader.read(&mut buf).unwrap_err();
        handle.join().unwrap();
        assert!(err.to_string().contains("custodial source read failed"));
    }
}
