//! Paged memory bus for an 8-bit console: a 16-bit address space split into 1KB pages, each page
//! bound through a page table to a backing block, with writes to 0xFFFC-0xFFFF forwarded to a
//! cartridge mapper for bank switching.

mod cartridge;
mod config;
mod mapper;
pub mod memory;
mod serialize;
mod session;

pub use cartridge::{Cartridge, CartridgeLoadError, CARTRIDGE_RAM_SIZE, ROM_BANK_SIZE};
pub use config::{BusConfig, StorageBackend, UnmappedAccess};
pub use mapper::{SegaMapper, SYSTEM_RAM_SIZE};
pub use serialize::{
    deserialize_session, determine_save_state_path, load_state, save_state, serialize_session,
    SaveStateError,
};
pub use session::{Session, SessionError};
