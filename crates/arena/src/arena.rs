#![forbid(unsafe_code)]

use crate::chunk::{Chunk, ChunkSet, Offset, SetKind};
use crate::config::ArenaConfig;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

/// Every allocation is rounded up to a multiple of this many bytes.
pub const ALIGNMENT: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    #[error(
        "arena out of memory: requested {requested} bytes at high-water mark {high_water_mark} of {capacity}"
    )]
    OutOfMemory {
        requested: usize,
        high_water_mark: usize,
        capacity: usize,
    },
    #[error("cannot insert any more chunks: {set} set holds {cap} descriptors")]
    ConfigurationExhausted { set: SetKind, cap: usize },
    #[error("offset {offset} is not a live allocation from this arena")]
    InvalidRelease { offset: Offset },
    #[error("offset {offset} does not start a live allocation")]
    OutOfBounds { offset: Offset },
    #[error("cannot reserve a backing store of {capacity} bytes")]
    BackingStore { capacity: usize },
}

/// Internal bookkeeping is inconsistent. Only produced by [`Arena::verify`];
/// every other detection path panics.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("arena invariant violated: {0}")]
pub struct InvariantViolation(pub String);

/// Abort on a broken internal invariant. These are bugs in the arena, never
/// in the caller.
#[track_caller]
pub(crate) fn invariant(cond: bool, msg: &str) {
    if !cond {
        panic!("arena invariant violated: {msg}");
    }
}

/// Round `size` up to [`ALIGNMENT`]; zero becomes one unit. `None` on overflow.
pub fn align_up(size: usize) -> Option<usize> {
    let size = size.max(1);
    size.checked_add(ALIGNMENT - 1).map(|s| s & !(ALIGNMENT - 1))
}

/// Point-in-time counters for an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaStats {
    pub capacity: usize,
    pub high_water_mark: usize,
    pub live_chunks: usize,
    pub live_bytes: usize,
    pub free_chunks: usize,
    pub free_bytes: usize,
}

/// Outcome of a [`Arena::coalesce`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coalesced {
    /// Number of adjacent pairs folded together.
    pub merged: usize,
    /// The whole store was free and the high-water mark went back to zero.
    pub reclaimed: bool,
}

/// Fixed-capacity bump arena with a sorted free list.
///
/// Allocations are handed out as [`Offset`]s into one backing buffer. Freed
/// ranges are reused first-fit before the high-water mark is advanced;
/// [`Arena::coalesce`] merges neighbouring free ranges and gives the whole
/// buffer back once nothing is live.
///
/// Not thread-safe: callers sharing one arena must serialize access.
#[derive(Debug, Clone)]
pub struct Arena {
    buf: Vec<u8>,
    high_water_mark: usize,
    live: ChunkSet,
    free: ChunkSet,
}

impl Arena {
    /// Create an arena; the backing store is allocated and zeroed up front.
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            buf: vec![0; config.capacity],
            high_water_mark: 0,
            live: ChunkSet::new(SetKind::Live, config.chunk_cap),
            free: ChunkSet::new(SetKind::Free, config.chunk_cap),
        }
    }

    /// Like [`Arena::new`], but reports a backing store that cannot be
    /// reserved instead of aborting.
    pub fn try_new(config: ArenaConfig) -> Result<Self, ArenaError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(config.capacity).map_err(|_| {
            warn!(capacity = config.capacity, "backing store reservation failed");
            ArenaError::BackingStore {
                capacity: config.capacity,
            }
        })?;
        buf.resize(config.capacity, 0);
        Ok(Self {
            buf,
            high_water_mark: 0,
            live: ChunkSet::new(SetKind::Live, config.chunk_cap),
            free: ChunkSet::new(SetKind::Free, config.chunk_cap),
        })
    }

    /// Create an arena of `cap` bytes with the default descriptor cap.
    pub fn with_capacity(cap: usize) -> Self {
        Self::new(ArenaConfig::default().with_capacity(cap))
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Maximum descriptors per chunk set.
    pub fn chunk_cap(&self) -> usize {
        self.live.cap()
    }

    pub fn high_water_mark(&self) -> usize {
        self.high_water_mark
    }

    /// Bytes never bump-allocated since the last reset or reclamation.
    pub fn remaining(&self) -> usize {
        self.capacity().saturating_sub(self.high_water_mark)
    }

    pub fn live(&self) -> &ChunkSet {
        &self.live
    }

    pub fn free(&self) -> &ChunkSet {
        &self.free
    }

    pub fn stats(&self) -> ArenaStats {
        ArenaStats {
            capacity: self.capacity(),
            high_water_mark: self.high_water_mark,
            live_chunks: self.live.len(),
            live_bytes: self.live.total_bytes(),
            free_chunks: self.free.len(),
            free_bytes: self.free.total_bytes(),
        }
    }

    /// Allocate at least `size` bytes and return the offset of the region.
    ///
    /// The first free chunk large enough is reused, split if larger than
    /// needed; otherwise the region is bumped off the untouched tail.
    /// Contents of the region are unspecified.
    pub fn allocate(&mut self, size: usize) -> Result<Offset, ArenaError> {
        let Some(rounded) = align_up(size) else {
            return Err(self.fail(ArenaError::OutOfMemory {
                requested: size,
                high_water_mark: self.high_water_mark,
                capacity: self.capacity(),
            }));
        };

        let start = match self.free.first_fit(rounded) {
            Some(index) => self.take_free(index, rounded)?,
            None => self.bump(rounded)?,
        };
        self.debug_verify();
        Ok(start)
    }

    fn take_free(&mut self, index: usize, rounded: usize) -> Result<Offset, ArenaError> {
        let chunk = self.free.as_slice()[index];
        self.live
            .insert(Chunk::new(chunk.start, rounded))
            .map_err(|e| self.fail(e))?;

        if chunk.size == rounded {
            self.free.remove_at(index);
        } else {
            let leftover = Chunk::new(
                Offset::new(chunk.start.get() + rounded),
                chunk.size - rounded,
            );
            self.free.replace_at(index, leftover);
        }
        debug!(
            offset = %chunk.start,
            size = rounded,
            leftover = chunk.size - rounded,
            "allocate: reused free chunk"
        );
        Ok(chunk.start)
    }

    fn bump(&mut self, rounded: usize) -> Result<Offset, ArenaError> {
        let end = self
            .high_water_mark
            .checked_add(rounded)
            .filter(|&end| end <= self.capacity());
        let Some(end) = end else {
            return Err(self.fail(ArenaError::OutOfMemory {
                requested: rounded,
                high_water_mark: self.high_water_mark,
                capacity: self.capacity(),
            }));
        };

        let start = Offset::new(self.high_water_mark);
        self.live
            .insert(Chunk::new(start, rounded))
            .map_err(|e| self.fail(e))?;
        self.high_water_mark = end;
        trace!(offset = %start, size = rounded, "allocate: bump");
        Ok(start)
    }

    /// Return a live allocation to the free list.
    pub fn release(&mut self, offset: Offset) -> Result<(), ArenaError> {
        let Some(index) = self.live.find_by_start(offset) else {
            return Err(self.fail(ArenaError::InvalidRelease { offset }));
        };
        let chunk = self.live.as_slice()[index];
        self.free.insert(chunk).map_err(|e| self.fail(e))?;
        self.live.remove_at(index);
        trace!(offset = %offset, size = chunk.size, "release");
        self.debug_verify();
        Ok(())
    }

    /// Merge byte-adjacent free chunks in a single pass. If afterwards one
    /// free chunk spans `[0, high_water_mark)`, the store is reclaimed.
    pub fn coalesce(&mut self) -> Coalesced {
        let mut merged = 0;
        let mut i = 0;
        while i + 1 < self.free.len() {
            let current = self.free.as_slice()[i];
            let next = self.free.as_slice()[i + 1];
            if current.touches(&next) {
                self.free
                    .replace_at(i, Chunk::new(current.start, current.size + next.size));
                self.free.remove_at(i + 1);
                merged += 1;
                // stay on i: the grown chunk may touch its new neighbour
            } else {
                i += 1;
            }
        }

        let reclaimed = match self.free.as_slice() {
            [only] => only.start.get() == 0 && only.size == self.high_water_mark,
            _ => false,
        };
        if reclaimed {
            info!(bytes = self.high_water_mark, "coalesce: whole arena reclaimed");
            self.high_water_mark = 0;
            self.free.clear();
        } else if merged > 0 {
            debug!(merged, free_chunks = self.free.len(), "coalesce");
        }
        self.debug_verify();
        Coalesced { merged, reclaimed }
    }

    /// Drop all bookkeeping and rewind to an empty arena. Stored bytes are
    /// left as they are and nothing is finalized.
    pub fn reset_all(&mut self) {
        if self.high_water_mark > 0 || !self.live.is_empty() || !self.free.is_empty() {
            info!(
                live_chunks = self.live.len(),
                high_water_mark = self.high_water_mark,
                "freeing all"
            );
        }
        self.high_water_mark = 0;
        self.live.clear();
        self.free.clear();
    }

    /// The live region starting at `offset`.
    pub fn bytes(&self, offset: Offset) -> Result<&[u8], ArenaError> {
        let chunk = self.live_chunk(offset)?;
        Ok(&self.buf[chunk.start.get()..chunk.end()])
    }

    /// The live region starting at `offset`, writable.
    pub fn bytes_mut(&mut self, offset: Offset) -> Result<&mut [u8], ArenaError> {
        let chunk = self.live_chunk(offset)?;
        Ok(&mut self.buf[chunk.start.get()..chunk.end()])
    }

    fn live_chunk(&self, offset: Offset) -> Result<Chunk, ArenaError> {
        self.live
            .find_by_start(offset)
            .map(|i| self.live.as_slice()[i])
            .ok_or(ArenaError::OutOfBounds { offset })
    }

    /// Check ordering, disjointness, bounds and conservation of both sets.
    pub fn verify(&self) -> Result<(), InvariantViolation> {
        let violation = |msg: String| -> Result<(), InvariantViolation> {
            Err(InvariantViolation(msg))
        };

        if self.high_water_mark > self.capacity() {
            return violation(format!(
                "high-water mark {} past capacity {}",
                self.high_water_mark,
                self.capacity()
            ));
        }
        for set in [&self.live, &self.free] {
            if set.len() > set.cap() {
                return violation(format!("{} set over its cap", set.kind()));
            }
            for c in set.iter() {
                if c.size == 0 || c.size % ALIGNMENT != 0 {
                    return violation(format!(
                        "{} chunk at {} has size {}",
                        set.kind(),
                        c.start,
                        c.size
                    ));
                }
                if c.end() > self.high_water_mark {
                    return violation(format!(
                        "{} chunk at {} ends past the high-water mark",
                        set.kind(),
                        c.start
                    ));
                }
            }
            for pair in set.as_slice().windows(2) {
                if pair[0].start >= pair[1].start {
                    return violation(format!(
                        "{} set not sorted at {}",
                        set.kind(),
                        pair[1].start
                    ));
                }
            }
        }

        let mut all: Vec<Chunk> = self.live.iter().chain(self.free.iter()).copied().collect();
        all.sort_by_key(|c| c.start);
        for pair in all.windows(2) {
            if pair[0].end() > pair[1].start.get() {
                return violation(format!(
                    "chunks at {} and {} overlap",
                    pair[0].start, pair[1].start
                ));
            }
        }

        let accounted = self.live.total_bytes() + self.free.total_bytes();
        if accounted != self.high_water_mark {
            return violation(format!(
                "live + free = {accounted} bytes but high-water mark is {}",
                self.high_water_mark
            ));
        }
        Ok(())
    }

    fn debug_verify(&self) {
        if cfg!(debug_assertions) {
            if let Err(e) = self.verify() {
                panic!("{e}");
            }
        }
    }

    fn fail(&self, err: ArenaError) -> ArenaError {
        match err {
            ArenaError::InvalidRelease { .. } | ArenaError::OutOfBounds { .. } => {
                debug!(error = %err, "arena request rejected")
            }
            _ => warn!(error = %err, "arena request failed"),
        }
        err
    }
}

/// Listing of the high-water mark and both chunk sets.
impl fmt::Display for Arena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "high-water mark: {} of {}",
            self.high_water_mark,
            self.capacity()
        )?;
        write!(f, "live {}", self.live)?;
        write!(f, "free {}", self.free)
    }
}
