#![forbid(unsafe_code)]

/// One mebibyte, the unit the presets are expressed in.
pub const MIB: usize = 1024 * 1024;

/// Sizing of an [`Arena`](crate::Arena): bytes in the backing store and the
/// maximum number of descriptors each chunk set may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArenaConfig {
    pub capacity: usize,
    pub chunk_cap: usize,
}

impl ArenaConfig {
    /// Exact byte capacity and per-set descriptor cap.
    pub const fn new(capacity: usize, chunk_cap: usize) -> Self {
        Self {
            capacity,
            chunk_cap,
        }
    }

    /// 64 MiB backing store, 1024 descriptors per set.
    pub const fn standard() -> Self {
        Self::new(64 * MIB, 1024)
    }

    /// 16 MiB backing store, 64 descriptors per set.
    pub const fn less_ram() -> Self {
        Self::new(16 * MIB, 64)
    }

    /// `mb` mebibytes of backing store with a caller-chosen descriptor cap.
    /// Panics if the byte count overflows; see [`ArenaConfig::try_custom_mb`].
    pub const fn custom_mb(mb: usize, chunk_cap: usize) -> Self {
        Self::new(mb * MIB, chunk_cap)
    }

    /// Like [`ArenaConfig::custom_mb`], `None` if `mb` mebibytes do not fit
    /// in a `usize`.
    pub const fn try_custom_mb(mb: usize, chunk_cap: usize) -> Option<Self> {
        match mb.checked_mul(MIB) {
            Some(capacity) => Some(Self::new(capacity, chunk_cap)),
            None => None,
        }
    }

    /// Same descriptor cap, different byte capacity.
    pub const fn with_capacity(self, capacity: usize) -> Self {
        Self::new(capacity, self.chunk_cap)
    }

    /// Same byte capacity, different descriptor cap.
    pub const fn with_chunk_cap(self, chunk_cap: usize) -> Self {
        Self::new(self.capacity, chunk_cap)
    }
}

impl Default for ArenaConfig {
    #[cfg(not(feature = "less-ram"))]
    fn default() -> Self {
        Self::standard()
    }

    #[cfg(feature = "less-ram")]
    fn default() -> Self {
        Self::less_ram()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        assert_eq!(ArenaConfig::standard(), ArenaConfig::new(64 * MIB, 1024));
        assert_eq!(ArenaConfig::less_ram(), ArenaConfig::new(16 * MIB, 64));
        assert_eq!(ArenaConfig::custom_mb(2, 8), ArenaConfig::new(2 * MIB, 8));
    }

    #[test]
    fn custom_mb_overflow_is_none() {
        assert_eq!(
            ArenaConfig::try_custom_mb(3, 16),
            Some(ArenaConfig::new(3 * MIB, 16))
        );
        assert_eq!(ArenaConfig::try_custom_mb(usize::MAX, 16), None);
        assert_eq!(ArenaConfig::try_custom_mb(usize::MAX / MIB + 1, 16), None);
    }

    #[test]
    fn builders_keep_other_field() {
        let cfg = ArenaConfig::less_ram().with_capacity(32);
        assert_eq!(cfg, ArenaConfig::new(32, 64));
        let cfg = cfg.with_chunk_cap(4);
        assert_eq!(cfg, ArenaConfig::new(32, 4));
    }

    #[cfg(not(feature = "less-ram"))]
    #[test]
    fn default_is_standard() {
        assert_eq!(ArenaConfig::default(), ArenaConfig::standard());
    }
}
