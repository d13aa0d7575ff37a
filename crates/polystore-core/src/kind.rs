//! Stable adapter kind identifiers.

use std::str::FromStr;

use polystore_common::StorageError;

/// Identifies an adapter variant.
///
/// The string forms are stable: they appear in error messages, in resolver
/// priority lists, and as accepted values of the `STORAGE_ADAPTER`
/// environment override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// Native embedded engine on a database file.
    Sqlite,
    /// Embedded engine fixed at `:memory:`.
    Memory,
    /// Fully in-memory serializable engine, optionally file-persisted.
    Embedded,
    /// Network-relational engine behind a connection pool.
    Postgres,
    /// Embedded engine persisted as a blob in an async key-value store.
    BlobStore,
    /// Host-provided native SQL plugin.
    Mobile,
}

impl AdapterKind {
    pub const ALL: [AdapterKind; 6] = [
        AdapterKind::Sqlite,
        AdapterKind::Memory,
        AdapterKind::Embedded,
        AdapterKind::Postgres,
        AdapterKind::BlobStore,
        AdapterKind::Mobile,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            AdapterKind::Sqlite => "sqlite",
            AdapterKind::Memory => "memory",
            AdapterKind::Embedded => "embedded",
            AdapterKind::Postgres => "postgres",
            AdapterKind::BlobStore => "blob-store",
            AdapterKind::Mobile => "mobile",
        }
    }
}

impl std::fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdapterKind {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(AdapterKind::Sqlite),
            "memory" => Ok(AdapterKind::Memory),
            "embedded" => Ok(AdapterKind::Embedded),
            "postgres" => Ok(AdapterKind::Postgres),
            "blob-store" => Ok(AdapterKind::BlobStore),
            "mobile" => Ok(AdapterKind::Mobile),
            other => Err(StorageError::Config(format!(
                "unknown adapter kind '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_all_kinds() {
        for kind in AdapterKind::ALL {
            assert_eq!(kind.as_str().parse::<AdapterKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let err = "cloud".parse::<AdapterKind>().unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
