//! Append-only byte accumulator for streamed data.
//!
//! `ByteSink` collects chunks of unpredictable size (HTTP response bodies,
//! subprocess pipes) and exposes the concatenation once the stream ends.
//! One NUL byte is always kept after the logical content so the buffer can
//! be handed to consumers that expect a terminated string.

use std::io;
use std::str::Utf8Error;
use thiserror::Error;

/// Errors raised while growing the sink.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("out of memory: cannot grow buffer to {requested} bytes{}", limit_suffix(.limit))]
    OutOfMemory {
        /// Total bytes (content plus sentinel) the failed append needed.
        requested: usize,
        /// Configured cap, if the failure came from the cap rather than the allocator.
        limit: Option<usize>,
    },
}

fn limit_suffix(limit: &Option<usize>) -> String {
    match limit {
        Some(max) => format!(" (limit {})", max),
        None => String::new(),
    }
}

impl From<SinkError> for io::Error {
    fn from(err: SinkError) -> Self {
        io::Error::new(io::ErrorKind::OutOfMemory, err)
    }
}

/// Growable, NUL-terminated byte buffer with a single writer.
#[derive(Debug, Clone)]
pub struct ByteSink {
    /// Content followed by exactly one `0` sentinel.
    data: Vec<u8>,
    /// Maximum content length in bytes, excluding the sentinel.
    limit: Option<usize>,
}

impl Default for ByteSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ByteSink {
    /// Create an empty sink with no size cap.
    pub fn new() -> Self {
        Self {
            data: vec![0],
            limit: None,
        }
    }

    /// Create an empty sink that refuses to hold more than `max_len` bytes.
    ///
    /// Exceeding the cap is reported as `OutOfMemory`, exactly like an
    /// allocator failure.
    pub fn with_limit(max_len: usize) -> Self {
        Self {
            data: vec![0],
            limit: Some(max_len),
        }
    }

    /// Number of content bytes (the sentinel is not counted).
    pub fn len(&self) -> usize {
        self.data.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Allocated capacity in bytes, sentinel slot included.
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Append `chunk` to the end of the accumulated data.
    ///
    /// On failure the accumulated contents are dropped and the allocation is
    /// released; the caller must treat the transfer as lost.
    pub fn append(&mut self, chunk: &[u8]) -> Result<(), SinkError> {
        let needed = match self.len().checked_add(chunk.len()) {
            Some(n) => n,
            None => return Err(self.fail(usize::MAX)),
        };

        if let Some(max) = self.limit {
            if needed > max {
                return Err(self.fail(needed.saturating_add(1)));
            }
        }

        // The sentinel slot is reused for the first chunk byte, so reserving
        // chunk.len() leaves room for len + chunk.len() + 1.
        if self.data.try_reserve(chunk.len()).is_err() {
            return Err(self.fail(needed.saturating_add(1)));
        }

        self.data.pop();
        self.data.extend_from_slice(chunk);
        self.data.push(0);
        Ok(())
    }

    fn fail(&mut self, requested: usize) -> SinkError {
        log::debug!(
            "byte sink growth failed at {} bytes, discarding {} buffered bytes",
            requested,
            self.len()
        );
        // Free the old buffer before allocating the one-byte sentinel.
        self.data = Vec::new();
        self.data.push(0);
        SinkError::OutOfMemory {
            requested,
            limit: self.limit,
        }
    }

    /// Read-only view of the accumulated bytes.
    pub fn finish(&self) -> &[u8] {
        &self.data[..self.len()]
    }

    /// Accumulated bytes followed by the NUL sentinel.
    pub fn as_bytes_with_nul(&self) -> &[u8] {
        &self.data
    }

    /// Accumulated bytes as UTF-8 text.
    pub fn as_str(&self) -> Result<&str, Utf8Error> {
        std::str::from_utf8(self.finish())
    }

    /// Empty the sink for a new transfer, keeping its allocation.
    pub fn reset(&mut self) {
        self.data.clear();
        self.data.push(0);
    }

    /// Take the accumulated bytes, without the sentinel.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.data.pop();
        self.data
    }
}

impl io::Write for ByteSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.append(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
