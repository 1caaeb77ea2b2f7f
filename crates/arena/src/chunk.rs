#![forbid(unsafe_code)]

use crate::arena::{invariant, ArenaError};
use std::fmt;

/// Byte offset into an arena's backing store.
///
/// Offsets replace raw pointers: there is no null offset, and every byte
/// access through one is bounds-checked against the live chunk it names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Offset(usize);

impl Offset {
    pub const fn new(value: usize) -> Self {
        Self(value)
    }

    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for Offset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Descriptor of the byte range `[start, start + size)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub start: Offset,
    pub size: usize,
}

impl Chunk {
    pub const fn new(start: Offset, size: usize) -> Self {
        Self { start, size }
    }

    /// One past the last byte of the range.
    pub const fn end(&self) -> usize {
        self.start.0 + self.size
    }

    /// True when `next` begins exactly where this chunk ends.
    pub const fn touches(&self, next: &Chunk) -> bool {
        self.end() == next.start.0
    }
}

/// Which of the arena's two chunk sets a descriptor lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Live,
    Free,
}

impl fmt::Display for SetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetKind::Live => f.write_str("live"),
            SetKind::Free => f.write_str("free"),
        }
    }
}

/// Capacity-bounded sequence of chunks kept strictly sorted by `start`.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    kind: SetKind,
    cap: usize,
    chunks: Vec<Chunk>,
}

impl ChunkSet {
    /// Empty set that will hold at most `cap` descriptors.
    pub fn new(kind: SetKind, cap: usize) -> Self {
        Self {
            kind,
            cap,
            chunks: Vec::with_capacity(cap),
        }
    }

    pub fn kind(&self) -> SetKind {
        self.kind
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.chunks.len() >= self.cap
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Chunk> {
        self.chunks.iter()
    }

    pub fn as_slice(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Sum of the sizes of every descriptor in the set.
    pub fn total_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.size).sum()
    }

    /// Insert keeping the order by `start`; returns the index it landed at.
    pub fn insert(&mut self, chunk: Chunk) -> Result<usize, ArenaError> {
        if self.is_full() {
            return Err(ArenaError::ConfigurationExhausted {
                set: self.kind,
                cap: self.cap,
            });
        }
        let index = self.chunks.partition_point(|c| c.start < chunk.start);
        invariant(
            self.chunks
                .get(index)
                .map_or(true, |c| c.start != chunk.start),
            "two chunks with the same start in one set",
        );
        self.chunks.insert(index, chunk);
        Ok(index)
    }

    /// Remove the descriptor at `index`, shifting the tail left.
    pub fn remove_at(&mut self, index: usize) -> Chunk {
        invariant(index < self.chunks.len(), "invalid index");
        self.chunks.remove(index)
    }

    /// Overwrite the descriptor at `index`; the new start must keep the
    /// set sorted relative to both neighbours.
    pub fn replace_at(&mut self, index: usize, chunk: Chunk) {
        invariant(index < self.chunks.len(), "invalid index");
        invariant(
            index == 0 || self.chunks[index - 1].start < chunk.start,
            "replacement breaks ordering with previous chunk",
        );
        invariant(
            self.chunks
                .get(index + 1)
                .map_or(true, |next| chunk.start < next.start),
            "replacement breaks ordering with next chunk",
        );
        self.chunks[index] = chunk;
    }

    /// Binary search on `start`; `None` if no descriptor begins there.
    pub fn find_by_start(&self, start: Offset) -> Option<usize> {
        let index = self
            .chunks
            .binary_search_by_key(&start, |c| c.start)
            .ok()?;
        invariant(
            index < self.chunks.len(),
            "returned index is out of bounds of the chunk set",
        );
        Some(index)
    }

    /// Index of the lowest-addressed descriptor of at least `size` bytes.
    pub fn first_fit(&self, size: usize) -> Option<usize> {
        self.chunks.iter().position(|c| c.size >= size)
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

impl fmt::Display for ChunkSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "chunks ({})", self.chunks.len())?;
        for c in &self.chunks {
            writeln!(f, "start: {}, size: {}", c.start, c.size)?;
        }
        Ok(())
    }
}
