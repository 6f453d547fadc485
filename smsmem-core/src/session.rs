use crate::cartridge::Cartridge;
use crate::config::{BusConfig, StorageBackend, UnmappedAccess};
use crate::mapper::SegaMapper;
use crate::memory::{BlockArena, MemoryBlock, MemoryBus, PageTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session configured for {configured} storage but instantiated with {actual} blocks")]
    BackendMismatch { configured: StorageBackend, actual: StorageBackend },
}

/// Everything that lives for as long as one loaded cartridge: the memory bus, its blocks, the page
/// table and the mapper that drives it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session<B> {
    config: BusConfig,
    bus: MemoryBus<B, SegaMapper>,
}

impl<B: MemoryBlock> Session<B> {
    /// Allocate all memory for the given cartridge and map it in its power-on state.
    pub fn init(config: BusConfig, cartridge: &Cartridge) -> Result<Self, SessionError> {
        if config.storage_backend != B::BACKEND {
            return Err(SessionError::BackendMismatch {
                configured: config.storage_backend,
                actual: B::BACKEND,
            });
        }

        log::info!("Initializing memory session with {config}");

        let mut blocks = BlockArena::new();
        let mapper = SegaMapper::load(cartridge, &mut blocks);
        let mut bus = MemoryBus::new(blocks, PageTable::new(), mapper, config.unmapped_access);

        let (mapper, context) = bus.split_handler();
        mapper.power_on(context);

        Ok(Self { config, bus })
    }

    /// Return paging and system RAM to their power-on state. Cartridge RAM is preserved.
    pub fn reset(&mut self) {
        log::debug!("Resetting memory session");

        let (mapper, context) = self.bus.split_handler();
        mapper.power_on(context);
    }

    /// End the session, handing back the cartridge RAM contents so the caller can persist them.
    pub fn teardown(self) -> Vec<u8> {
        let (blocks, _, mapper) = self.bus.into_parts();
        let cartridge_ram = mapper.cartridge_ram(&blocks);

        log::debug!("Tore down memory session, released {} blocks", blocks.len());

        cartridge_ram
    }

    pub fn config(&self) -> BusConfig {
        self.config
    }

    pub fn bus(&self) -> &MemoryBus<B, SegaMapper> {
        &self.bus
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut MemoryBus<B, SegaMapper> {
        &mut self.bus
    }

    #[inline]
    pub fn read_byte(&self, address: u16) -> u8 {
        self.bus.read_byte(address)
    }

    #[inline]
    pub fn read_word(&self, address: u16) -> u16 {
        self.bus.read_word(address)
    }

    #[inline]
    pub fn write_byte(&mut self, address: u16, value: u8) {
        self.bus.write_byte(address, value);
    }

    /// Check that every block referenced by the page table or the mapper exists. Used to reject
    /// corrupt save states before they are dereferenced.
    pub(crate) fn blocks_consistent(&self) -> bool {
        let blocks = self.bus.blocks();
        self.bus.page_table().bound_blocks().all(|block| blocks.contains(block))
            && self.bus.paging_handler().owned_blocks().all(|block| blocks.contains(block))
    }

    pub(crate) fn mapper_layout_consistent(&self) -> bool {
        self.bus.paging_handler().layout_consistent(self.bus.blocks())
    }

    /// Switch the unmapped access policy, e.g. after restoring a state saved under another one.
    pub fn set_unmapped_access(&mut self, unmapped_access: UnmappedAccess) {
        self.config.unmapped_access = unmapped_access;
        self.bus.set_unmapped_access(unmapped_access);
    }
}
