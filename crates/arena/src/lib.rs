#![forbid(unsafe_code)]

//! Fixed-capacity arena allocator: one pre-reserved byte buffer, a bump
//! pointer, and two address-sorted chunk sets (live and free).
//!
//! ```
//! use arena::{Arena, ArenaConfig};
//!
//! let mut arena = Arena::new(ArenaConfig::new(64, 8));
//! let s = arena.allocate(26)?;
//! for (i, b) in arena.bytes_mut(s)?.iter_mut().take(26).enumerate() {
//!     *b = b'a' + i as u8;
//! }
//! assert_eq!(&arena.bytes(s)?[..3], b"abc");
//! arena.release(s)?;
//! assert!(arena.coalesce().reclaimed);
//! # Ok::<(), arena::ArenaError>(())
//! ```

pub mod arena;
pub mod chunk;
pub mod config;

pub use arena::{
    align_up, Arena, ArenaError, ArenaStats, Coalesced, InvariantViolation, ALIGNMENT,
};
pub use chunk::{Chunk, ChunkSet, Offset, SetKind};
pub use config::ArenaConfig;
