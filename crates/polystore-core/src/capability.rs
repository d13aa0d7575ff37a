//! Capability vocabulary and per-adapter capability sets.
//!
//! Each adapter declares a compile-time constant [`Capabilities`] bitmask.
//! Callers either gate optional operations on [`Capabilities::has`] or use
//! the degradation helpers in [`crate::ext`].

/// Closed vocabulary of optional adapter features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Capability {
    /// Statements execute synchronously on the caller's thread.
    Sync = 0,
    /// ACID transactions.
    Transactions = 1,
    /// Write-ahead logging.
    Wal = 2,
    /// File locking.
    Locks = 3,
    /// Durable persistence.
    Persistence = 4,
    /// Result streaming.
    Streaming = 5,
    /// Bulk batch execution.
    Batch = 6,
    /// Prepared statements.
    Prepared = 7,
    /// Concurrent writers.
    Concurrent = 8,
    /// Native JSON values.
    Json = 9,
    /// Native array values.
    Arrays = 10,
}

impl Capability {
    pub const ALL: [Capability; 11] = [
        Capability::Sync,
        Capability::Transactions,
        Capability::Wal,
        Capability::Locks,
        Capability::Persistence,
        Capability::Streaming,
        Capability::Batch,
        Capability::Prepared,
        Capability::Concurrent,
        Capability::Json,
        Capability::Arrays,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Capability::Sync => "sync",
            Capability::Transactions => "transactions",
            Capability::Wal => "wal",
            Capability::Locks => "locks",
            Capability::Persistence => "persistence",
            Capability::Streaming => "streaming",
            Capability::Batch => "batch",
            Capability::Prepared => "prepared",
            Capability::Concurrent => "concurrent",
            Capability::Json => "json",
            Capability::Arrays => "arrays",
        }
    }

    const fn bit(self) -> u16 {
        1u16 << (self as u8)
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fixed set of capabilities, declared per adapter at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities(u16);

impl Capabilities {
    pub const EMPTY: Capabilities = Capabilities(0);

    /// Builds a set from a slice, usable in `const` declarations.
    pub const fn new(caps: &[Capability]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < caps.len() {
            bits |= caps[i].bit();
            i += 1;
        }
        Capabilities(bits)
    }

    pub const fn with(self, cap: Capability) -> Self {
        Capabilities(self.0 | cap.bit())
    }

    pub const fn union(self, other: Capabilities) -> Self {
        Capabilities(self.0 | other.0)
    }

    pub const fn has(self, cap: Capability) -> bool {
        self.0 & cap.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Capability> {
        Capability::ALL.into_iter().filter(move |cap| self.has(*cap))
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for cap in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(cap.as_str())?;
            first = false;
        }
        Ok(())
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Capabilities::EMPTY, Capabilities::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_CAPS: Capabilities = Capabilities::new(&[
        Capability::Sync,
        Capability::Transactions,
        Capability::Wal,
        Capability::Persistence,
    ]);

    #[test]
    fn test_const_set_membership() {
        assert!(FILE_CAPS.has(Capability::Sync));
        assert!(FILE_CAPS.has(Capability::Wal));
        assert!(!FILE_CAPS.has(Capability::Concurrent));
        assert_eq!(FILE_CAPS.len(), 4);
    }

    #[test]
    fn test_with_and_union() {
        let base = Capabilities::new(&[Capability::Transactions]);
        let extended = base.with(Capability::Json);
        assert!(extended.has(Capability::Json));
        assert!(extended.has(Capability::Transactions));

        let merged = base.union(Capabilities::new(&[Capability::Arrays]));
        assert!(merged.has(Capability::Arrays));
    }

    #[test]
    fn test_iter_matches_declaration_order() {
        let caps: Vec<Capability> = FILE_CAPS.iter().collect();
        assert_eq!(
            caps,
            vec![
                Capability::Sync,
                Capability::Transactions,
                Capability::Wal,
                Capability::Persistence,
            ]
        );
    }

    #[test]
    fn test_display() {
        let caps = Capabilities::new(&[Capability::Sync, Capability::Batch]);
        assert_eq!(caps.to_string(), "sync,batch");
    }

    #[test]
    fn test_empty() {
        assert!(Capabilities::EMPTY.is_empty());
        assert_eq!(Capabilities::EMPTY.iter().count(), 0);
    }
}
