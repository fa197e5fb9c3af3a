//! A chain of immutable byte chunks read as one logical byte range.
//!
//! Network reads rarely line up with frame boundaries. Instead of concatenating
//! them into a single contiguous buffer, every read is kept as its own [`Bytes`]
//! chunk tagged with the offset where it starts in the logical range. The chain
//! implements [`Buf`], so the framing codec and `prost` decode straight across
//! chunk boundaries.

use std::io::{self, ErrorKind, Read};

use bytes::{Buf, Bytes};

/// Chunk size used by [`ChunkChain::read_from`] when none is given.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Clone, Debug)]
struct Chunk {
    // offset of the first byte of `data` in the logical range
    running_start: usize,
    data: Bytes,
}

impl Chunk {
    fn end(&self) -> usize {
        self.running_start + self.data.len()
    }
}

/// Append-only sequence of byte chunks exposing a [`Buf`] cursor over all of them.
#[derive(Clone, Debug, Default)]
pub struct ChunkChain {
    chunks: Vec<Chunk>,
    len: usize,
    // logical read position
    position: usize,
    // index of the chunk holding `position`
    current: usize,
}

impl ChunkChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk at the end of the logical range. Empty chunks are ignored.
    pub fn push(&mut self, data: impl Into<Bytes>) {
        let data = data.into();
        if data.is_empty() {
            return;
        }
        let running_start = self.len;
        self.len += data.len();
        self.chunks.push(Chunk {
            running_start,
            data,
        });
    }

    /// Total length of the logical range, regardless of the read position.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no bytes were ever pushed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of chunks backing the range.
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Returns the byte at `index` of the logical range.
    pub fn byte_at(&self, index: usize) -> Option<u8> {
        if index >= self.len {
            return None;
        }
        let pos = self
            .chunks
            .partition_point(|chunk| chunk.running_start <= index);
        let chunk = &self.chunks[pos - 1];
        chunk.data.get(index - chunk.running_start).copied()
    }

    /// Drains `reader` into a chain, keeping each read as a separate chunk of at most
    /// `chunk_size` bytes.
    pub fn read_from<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Self> {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let mut chain = Self::new();
        loop {
            let mut buf = vec![0u8; chunk_size];
            match reader.read(&mut buf) {
                Ok(0) => return Ok(chain),
                Ok(read) => {
                    buf.truncate(read);
                    chain.push(buf);
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
    }
}

impl Buf for ChunkChain {
    fn remaining(&self) -> usize {
        self.len - self.position
    }

    fn chunk(&self) -> &[u8] {
        match self.chunks.get(self.current) {
            Some(chunk) => &chunk.data[self.position - chunk.running_start..],
            None => &[],
        }
    }

    fn advance(&mut self, cnt: usize) {
        assert!(
            cnt <= self.remaining(),
            "cannot advance past the end of the chunk chain"
        );
        self.position += cnt;
        while let Some(chunk) = self.chunks.get(self.current) {
            if self.position < chunk.end() {
                break;
            }
            self.current += 1;
        }
    }
}

impl From<Bytes> for ChunkChain {
    fn from(data: Bytes) -> Self {
        let mut chain = Self::new();
        chain.push(data);
        chain
    }
}

impl From<Vec<u8>> for ChunkChain {
    fn from(data: Vec<u8>) -> Self {
        Bytes::from(data).into()
    }
}

impl FromIterator<Bytes> for ChunkChain {
    fn from_iter<I: IntoIterator<Item = Bytes>>(iter: I) -> Self {
        let mut chain = Self::new();
        iter.into_iter().for_each(|chunk| chain.push(chunk));
        chain
    }
}
