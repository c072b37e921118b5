//! Pluggable output sink: the response body is written through one of
//! three interchangeable modes, matching the source's `output_samp`
//! dispatch. The HTTP front uses the growable-buffer mode so it can
//! learn the body length for `Content-Length` before writing anything
//! to the wire; stdout and raw-descriptor modes exist for tests and
//! offline tooling.

use std::io::{self, Write};
use std::os::unix::io::RawFd;

const OUTBUF_DEF_SIZE: usize = 1024 * 1024;

#[derive(Debug, Default)]
struct GrowableBuffer {
    data: Vec<u8>,
    offset: usize,
}

impl GrowableBuffer {
    fn new() -> Self {
        GrowableBuffer {
            data: Vec::new(),
            offset: 0,
        }
    }

    fn append(&mut self, bytes: &[u8]) {
        if self.data.is_empty() {
            self.data = vec![0u8; OUTBUF_DEF_SIZE];
        }

        while self.data.len() - self.offset < bytes.len() {
            let new_size = self.data.len() * 2;
            self.data.resize(new_size, 0);
        }

        self.data[self.offset..self.offset + bytes.len()].copy_from_slice(bytes);
        self.offset += bytes.len();
    }

    fn as_slice(&self) -> &[u8] {
        &self.data[..self.offset]
    }

    fn reset(&mut self) {
        self.data[..self.offset].fill(0);
        self.offset = 0;
    }
}

/// One of the three response-body destinations described in
/// SPEC_FULL.md §4.1.
pub enum OutputSink {
    Stdout,
    Fd(RawFd),
    Buffer(GrowableBuffer),
}

impl OutputSink {
    pub fn stdout() -> Self {
        OutputSink::Stdout
    }

    pub fn fd(fd: RawFd) -> Self {
        OutputSink::Fd(fd)
    }

    pub fn buffer() -> Self {
        OutputSink::Buffer(GrowableBuffer::new())
    }

    /// Appends `bytes` to the sink. The raw-descriptor mode performs a
    /// single blocking write with no retry on a short write, matching
    /// the source's inherited limitation.
    pub fn append(&mut self, bytes: &[u8]) -> io::Result<()> {
        match self {
            OutputSink::Stdout => {
                io::stdout().write_all(bytes)?;
                Ok(())
            }
            OutputSink::Fd(fd) => {
                use std::os::unix::io::FromRawFd;
                // Borrow the fd for one write without taking ownership:
                // wrap-and-forget avoids closing it when the temporary
                // File is dropped.
                let mut file = unsafe { std::fs::File::from_raw_fd(*fd) };
                let result = file.write_all(bytes);
                std::mem::forget(file);
                result
            }
            OutputSink::Buffer(buf) => {
                buf.append(bytes);
                Ok(())
            }
        }
    }

    /// The accumulated body, valid for the `Buffer` mode only.
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            OutputSink::Buffer(buf) => buf.as_slice(),
            _ => &[],
        }
    }

    /// Invokes `f` with a read-only view of the sink (typically to
    /// forward `as_bytes()` over a connection), then resets the buffer
    /// mode so the same sink can serve the next request.
    pub fn done<F: FnOnce(&OutputSink)>(&mut self, f: F) {
        f(self);
        if let OutputSink::Buffer(buf) = self {
            buf.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_grows_past_initial_capacity() {
        let mut sink = OutputSink::buffer();
        let chunk = vec![b'x'; OUTBUF_DEF_SIZE];
        sink.append(&chunk).unwrap();
        sink.append(b"more").unwrap();
        assert_eq!(sink.as_bytes().len(), OUTBUF_DEF_SIZE + 4);
    }

    #[test]
    fn done_resets_buffer_for_reuse() {
        let mut sink = OutputSink::buffer();
        sink.append(b"hello").unwrap();
        let mut seen = Vec::new();
        sink.done(|s| seen.extend_from_slice(s.as_bytes()));
        assert_eq!(seen, b"hello");
        assert_eq!(sink.as_bytes().len(), 0);

        sink.append(b"again").unwrap();
        assert_eq!(sink.as_bytes(), b"again");
    }
}
