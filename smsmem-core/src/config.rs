use serde::{Deserialize, Serialize};
use smsmem_proc_macros::{EnumDisplay, EnumFromStr, StrDeserialize, StrSerialize};
use std::fmt::Formatter;

/// How memory blocks store their bytes. Both strategies are observably identical; the choice is
/// made once when a session is created.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    EnumDisplay,
    EnumFromStr,
    StrSerialize,
    StrDeserialize,
)]
pub enum StorageBackend {
    /// Byte buffers with little-endian word accessors
    #[default]
    TypedBuffer,
    /// Arrays of numeric cells, words composed with shifts and masks
    NumericArray,
}

/// What the bus does when an access resolves to an unmapped page or to a block that is too short
/// for the requested offset.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    EnumDisplay,
    EnumFromStr,
    StrSerialize,
    StrDeserialize,
)]
pub enum UnmappedAccess {
    /// Panic with the address and page of the failed access
    Panic,
    /// Reads return 0xFF and writes are dropped
    OpenBus,
}

impl Default for UnmappedAccess {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::Panic
        } else {
            Self::OpenBus
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default)]
    pub storage_backend: StorageBackend,
    #[serde(default)]
    pub unmapped_access: UnmappedAccess,
}

impl std::fmt::Display for BusConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "storage_backend={}, unmapped_access={}",
            self.storage_backend, self.unmapped_access
        )
    }
}
