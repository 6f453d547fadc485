
use crate::config::UnmappedAccess;
use crate::memory::address::{self, PageAddress};
use crate::memory::block::{BlockArena, BlockId, MemoryBlock};
use crate::memory::pagetable::{MapDirection, PageTable};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Value returned by reads that cannot be resolved when running in open-bus mode.
pub const OPEN_BUS_VALUE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("{direction} access to unmapped page {page} at address {address:04X}")]
    UnmappedPage { direction: MapDirection, address: u16, page: usize },
    #[error("{direction} access at address {address:04X} (page {page}) needs {required_len} bytes of block {block}, which only has {block_len}")]
    OffsetOutOfRange {
        direction: MapDirection,
        address: u16,
        page: usize,
        block: BlockId,
        required_len: usize,
        block_len: usize,
    },
}

/// What a paging register handler is allowed to touch while handling a register write. The bus
/// itself is not reachable from here, so a handler cannot issue nested bus accesses.
pub struct PagingContext<'a, B> {
    pub page_table: &'a mut PageTable,
    pub blocks: &'a mut BlockArena<B>,
}

/// Receiver for writes to the paging registers at 0xFFFC-0xFFFF, typically a cartridge mapper.
///
/// Called synchronously from within the bus write, after the written byte has been stored.
pub trait PagingHandler {
    fn on_paging_write<B: MemoryBlock>(
        &mut self,
        register: u8,
        value: u8,
        context: PagingContext<'_, B>,
    );
}

/// Handler for buses that have nothing to bank switch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NoPaging;

impl PagingHandler for NoPaging {
    fn on_paging_write<B: MemoryBlock>(&mut self, _: u8, _: u8, _: PagingContext<'_, B>) {}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryBus<B, H> {
    blocks: BlockArena<B>,
    page_table: PageTable,
    paging_handler: H,
    unmapped_access: UnmappedAccess,
}

impl<B: MemoryBlock, H: PagingHandler> MemoryBus<B, H> {
    pub fn new(
        blocks: BlockArena<B>,
        page_table: PageTable,
        paging_handler: H,
        unmapped_access: UnmappedAccess,
    ) -> Self {
        Self { blocks, page_table, paging_handler, unmapped_access }
    }

    /// Read a byte, applying the configured unmapped access policy on failure.
    #[inline]
    pub fn read_byte(&self, address: u16) -> u8 {
        match self.try_read_byte(address) {
            Ok(value) => value,
            Err(err) => self.unmapped_read(err),
        }
    }

    /// Read a little-endian word. If the word straddles two pages, each byte is read through its
    /// own page binding.
    #[inline]
    pub fn read_word(&self, address: u16) -> u16 {
        let page_address = address::translate(address);
        if page_address.is_page_split() {
            let low = self.read_byte(address);
            let high = self.read_byte(address.wrapping_add(1));
            return u16::from_le_bytes([low, high]);
        }

        match self.locate(MapDirection::Read, address, page_address, 2) {
            Ok(block) => self.blocks.get(block).read_word(page_address.offset),
            Err(err) => {
                let value = self.unmapped_read(err);
                u16::from_le_bytes([value, value])
            }
        }
    }

    /// Write a byte, applying the configured unmapped access policy on failure. Writes to the
    /// paging register range are forwarded to the paging handler whether or not the store
    /// itself succeeded.
    #[inline]
    pub fn write_byte(&mut self, address: u16, value: u8) {
        if let Err(err) = self.store_byte(address, value) {
            self.unmapped_write(err);
        }

        self.check_paging_registers(address, value);
    }

    /// Write a little-endian word as two byte writes, low byte first.
    pub fn write_word(&mut self, address: u16, value: u16) {
        let [low, high] = value.to_le_bytes();
        self.write_byte(address, low);
        self.write_byte(address.wrapping_add(1), high);
    }

    pub fn try_read_byte(&self, address: u16) -> Result<u8, BusError> {
        let page_address = address::translate(address);
        let block = self.locate(MapDirection::Read, address, page_address, 1)?;
        Ok(self.blocks.get(block).get(page_address.offset))
    }

    pub fn try_read_word(&self, address: u16) -> Result<u16, BusError> {
        let page_address = address::translate(address);
        if page_address.is_page_split() {
            let low = self.try_read_byte(address)?;
            let high = self.try_read_byte(address.wrapping_add(1))?;
            return Ok(u16::from_le_bytes([low, high]));
        }

        let block = self.locate(MapDirection::Read, address, page_address, 2)?;
        Ok(self.blocks.get(block).read_word(page_address.offset))
    }

    /// Like [`Self::write_byte`] but reports resolution failures instead of applying the
    /// unmapped access policy. The paging handler is still notified on failure.
    pub fn try_write_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        let result = self.store_byte(address, value);
        self.check_paging_registers(address, value);
        result
    }

    #[inline]
    fn store_byte(&mut self, address: u16, value: u8) -> Result<(), BusError> {
        let page_address = address::translate(address);
        let block = self.locate(MapDirection::Write, address, page_address, 1)?;
        self.blocks.get_mut(block).set(page_address.offset, value);
        Ok(())
    }

    #[inline]
    fn check_paging_registers(&mut self, address: u16, value: u8) {
        let Some(register) = address::paging_register(address) else { return };

        log::trace!("Paging register {register} written with {value:02X}");

        self.paging_handler.on_paging_write(
            register,
            value,
            PagingContext { page_table: &mut self.page_table, blocks: &mut self.blocks },
        );
    }

    /// Resolve the block bound to the address's page and check that it holds `width` bytes
    /// starting at the page offset.
    #[inline]
    fn locate(
        &self,
        direction: MapDirection,
        address: u16,
        PageAddress { page, offset }: PageAddress,
        width: usize,
    ) -> Result<BlockId, BusError> {
        let Some(block) = self.page_table.get(direction, page) else {
            return Err(BusError::UnmappedPage { direction, address, page });
        };

        // A binding to a block outside this arena resolves like an unbound page
        let Some(block_len) = self.blocks.try_get(block).map(MemoryBlock::len) else {
            return Err(BusError::UnmappedPage { direction, address, page });
        };
        let required_len = offset + width;
        if block_len < required_len {
            return Err(BusError::OffsetOutOfRange {
                direction,
                address,
                page,
                block,
                required_len,
                block_len,
            });
        }

        Ok(block)
    }

    #[cold]
    fn unmapped_read(&self, err: BusError) -> u8 {
        match self.unmapped_access {
            UnmappedAccess::Panic => panic!("{err}"),
            UnmappedAccess::OpenBus => {
                log::trace!("{err}; reading open bus value {OPEN_BUS_VALUE:02X}");
                OPEN_BUS_VALUE
            }
        }
    }

    #[cold]
    fn unmapped_write(&self, err: BusError) {
        match self.unmapped_access {
            UnmappedAccess::Panic => panic!("{err}"),
            UnmappedAccess::OpenBus => {
                log::trace!("{err}; dropping write");
            }
        }
    }

    pub fn unmapped_access(&self) -> UnmappedAccess {
        self.unmapped_access
    }

    pub fn set_unmapped_access(&mut self, unmapped_access: UnmappedAccess) {
        self.unmapped_access = unmapped_access;
    }

    pub fn page_table(&self) -> &PageTable {
        &self.page_table
    }

    pub fn blocks(&self) -> &BlockArena<B> {
        &self.blocks
    }

    pub fn paging_handler(&self) -> &H {
        &self.paging_handler
    }

    #[cfg(test)]
    pub(crate) fn paging_handler_mut(&mut self) -> &mut H {
        &mut self.paging_handler
    }

    /// Split the bus into the handler and a paging context, for callers that need to drive the
    /// handler directly (power-on, reset).
    pub fn split_handler(&mut self) -> (&mut H, PagingContext<'_, B>) {
        (
            &mut self.paging_handler,
            PagingContext { page_table: &mut self.page_table, blocks: &mut self.blocks },
        )
    }

    pub fn into_parts(self) -> (BlockArena<B>, PageTable, H) {
        (self.blocks, self.page_table, self.paging_handler)
    }
}
