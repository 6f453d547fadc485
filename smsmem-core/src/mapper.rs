use crate::cartridge::{Cartridge, CARTRIDGE_RAM_SIZE, MAX_ROM_BANKS, ROM_BANK_SIZE};
use crate::memory::{
    BlockArena, BlockId, MapDirection, MemoryBlock, PageTable, PagingContext, PagingHandler,
    PAGE_SIZE,
};
use serde::{Deserialize, Serialize};

pub const SYSTEM_RAM_SIZE: usize = 8 * 1024;

const PAGES_PER_BANK: usize = ROM_BANK_SIZE / PAGE_SIZE;

const SLOT_0_FIRST_PAGE: usize = 0;
const SLOT_1_FIRST_PAGE: usize = PAGES_PER_BANK;
const SLOT_2_FIRST_PAGE: usize = 2 * PAGES_PER_BANK;
const SYSTEM_RAM_FIRST_PAGE: usize = 3 * PAGES_PER_BANK;
const SYSTEM_RAM_PAGES: usize = SYSTEM_RAM_SIZE / PAGE_SIZE;
const CARTRIDGE_RAM_PAGES: usize = CARTRIDGE_RAM_SIZE / PAGE_SIZE;

// Register 0 bits
const CARTRIDGE_RAM_ENABLE: u8 = 0x08;
const CARTRIDGE_RAM_BANK_SELECT: u8 = 0x04;

const POWER_ON_REGISTERS: [u8; 4] = [0x00, 0x00, 0x01, 0x02];

/// Standard Sega paging: three 16KB slots of ROM, optionally replacing the third with cartridge
/// RAM, followed by 8KB of system RAM mirrored once.
///
/// | register | address | effect |
/// |---|---|---|
/// | 0 | 0xFFFC | bit 3 maps cartridge RAM into slot 2, bit 2 selects the RAM bank |
/// | 1 | 0xFFFD | ROM bank in slot 0 (0x0000-0x3FFF), except the first 1KB which is fixed |
/// | 2 | 0xFFFE | ROM bank in slot 1 (0x4000-0x7FFF) |
/// | 3 | 0xFFFF | ROM bank in slot 2 (0x8000-0xBFFF) |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegaMapper {
    registers: [u8; 4],
    rom_pages: Vec<BlockId>,
    cartridge_ram_pages: Vec<BlockId>,
    system_ram_pages: Vec<BlockId>,
    // Absorbs writes to ROM pages
    write_sink: BlockId,
}

impl SegaMapper {
    /// Allocate every block the cartridge and console need. Nothing is mapped until
    /// [`Self::power_on`] is called.
    pub fn load<B: MemoryBlock>(cartridge: &Cartridge, blocks: &mut BlockArena<B>) -> Self {
        let rom_pages: Vec<_> = cartridge
            .rom()
            .chunks(PAGE_SIZE)
            .map(|page| blocks.allocate(B::from_bytes(page)))
            .collect();

        let mut cartridge_ram = vec![0; CARTRIDGE_RAM_SIZE];
        if let Some(ram) = cartridge.ram() {
            cartridge_ram[..ram.len()].copy_from_slice(ram);
        }
        let cartridge_ram_pages = cartridge_ram
            .chunks(PAGE_SIZE)
            .map(|page| blocks.allocate(B::from_bytes(page)))
            .collect();

        let system_ram_pages =
            (0..SYSTEM_RAM_PAGES).map(|_| blocks.allocate_zeroed(PAGE_SIZE)).collect();

        let write_sink = blocks.allocate_zeroed(PAGE_SIZE);

        log::debug!(
            "Allocated {} ROM pages ({} banks) and {} blocks total",
            rom_pages.len(),
            rom_pages.len() / PAGES_PER_BANK,
            blocks.len()
        );

        Self {
            registers: POWER_ON_REGISTERS,
            rom_pages,
            cartridge_ram_pages,
            system_ram_pages,
            write_sink,
        }
    }

    /// Restore power-on register values, clear system RAM and rebuild the whole page table.
    /// Cartridge RAM is battery backed and keeps its contents.
    pub fn power_on<B: MemoryBlock>(&mut self, context: PagingContext<'_, B>) {
        self.registers = POWER_ON_REGISTERS;

        for &block in &self.system_ram_pages {
            context.blocks.get_mut(block).fill(0x00);
        }

        let page_table = context.page_table;
        page_table.clear();
        self.map_slot_0(page_table);
        self.map_slot_1(page_table);
        self.map_slot_2(page_table);

        for (i, &block) in self.system_ram_pages.iter().enumerate() {
            page_table.bind_read_write(SYSTEM_RAM_FIRST_PAGE + i, block);
            page_table.bind_read_write(SYSTEM_RAM_FIRST_PAGE + SYSTEM_RAM_PAGES + i, block);
        }
    }

    pub fn registers(&self) -> [u8; 4] {
        self.registers
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom_pages.len() / PAGES_PER_BANK
    }

    /// Every block id this mapper may bind.
    pub fn owned_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.rom_pages
            .iter()
            .chain(&self.cartridge_ram_pages)
            .chain(&self.system_ram_pages)
            .copied()
            .chain(std::iter::once(self.write_sink))
    }

    /// Whether the block lists have the shape [`Self::load`] produces: whole ROM banks, both
    /// cartridge RAM banks, all of system RAM, and every owned block present and one page long.
    /// Bank switching relies on this, so restored state must pass it before use.
    pub fn layout_consistent<B: MemoryBlock>(&self, blocks: &BlockArena<B>) -> bool {
        let rom_pages = self.rom_pages.len();

        rom_pages != 0
            && rom_pages % PAGES_PER_BANK == 0
            && rom_pages <= MAX_ROM_BANKS * PAGES_PER_BANK
            && self.cartridge_ram_pages.len() == CARTRIDGE_RAM_PAGES
            && self.system_ram_pages.len() == SYSTEM_RAM_PAGES
            && self
                .owned_blocks()
                .all(|block| blocks.try_get(block).is_some_and(|block| block.len() == PAGE_SIZE))
    }

    pub fn cartridge_ram<B: MemoryBlock>(&self, blocks: &BlockArena<B>) -> Vec<u8> {
        collect_bytes(&self.cartridge_ram_pages, blocks)
    }

    pub fn system_ram<B: MemoryBlock>(&self, blocks: &BlockArena<B>) -> Vec<u8> {
        collect_bytes(&self.system_ram_pages, blocks)
    }

    fn map_rom_bank(&self, page_table: &mut PageTable, first_page: usize, bank_number: u8) {
        let bank = usize::from(bank_number) % self.rom_bank_count();
        let pages = &self.rom_pages[bank * PAGES_PER_BANK..(bank + 1) * PAGES_PER_BANK];

        page_table.bind_range(MapDirection::Read, first_page, pages.iter().copied());
        page_table.bind_range(
            MapDirection::Write,
            first_page,
            std::iter::repeat(self.write_sink).take(PAGES_PER_BANK),
        );
    }

    fn map_slot_0(&self, page_table: &mut PageTable) {
        self.map_rom_bank(page_table, SLOT_0_FIRST_PAGE, self.registers[1]);

        // The interrupt vectors in the first 1KB always come from bank 0
        page_table.bind(MapDirection::Read, SLOT_0_FIRST_PAGE, self.rom_pages[0]);
    }

    fn map_slot_1(&self, page_table: &mut PageTable) {
        self.map_rom_bank(page_table, SLOT_1_FIRST_PAGE, self.registers[2]);
    }

    fn map_slot_2(&self, page_table: &mut PageTable) {
        let control = self.registers[0];
        if control & CARTRIDGE_RAM_ENABLE != 0 {
            let bank = usize::from(control & CARTRIDGE_RAM_BANK_SELECT != 0);
            let pages =
                &self.cartridge_ram_pages[bank * PAGES_PER_BANK..(bank + 1) * PAGES_PER_BANK];
            for (i, &block) in pages.iter().enumerate() {
                page_table.bind_read_write(SLOT_2_FIRST_PAGE + i, block);
            }
        } else {
            self.map_rom_bank(page_table, SLOT_2_FIRST_PAGE, self.registers[3]);
        }
    }
}

impl PagingHandler for SegaMapper {
    fn on_paging_write<B: MemoryBlock>(
        &mut self,
        register: u8,
        value: u8,
        context: PagingContext<'_, B>,
    ) {
        self.registers[usize::from(register & 0x03)] = value;

        match register & 0x03 {
            0x00 | 0x03 => self.map_slot_2(context.page_table),
            0x01 => self.map_slot_0(context.page_table),
            0x02 => self.map_slot_1(context.page_table),
            _ => panic!("{register} & 0x03 produced a number that was not 0x00/0x01/0x02/0x03"),
        }
    }
}

fn collect_bytes<B: MemoryBlock>(pages: &[BlockId], blocks: &BlockArena<B>) -> Vec<u8> {
    pages.iter().flat_map(|&block| blocks.get(block).to_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BusConfig, StorageBackend, UnmappedAccess};
    use crate::memory::{ArrayBlock, MemoryBus, TypedBlock};
    use crate::serialize::{deserialize_session, serialize_session, SaveStateError};
    use crate::session::Session;

    // Every 1KB of bank N is filled with N
    fn banked_rom(bank_count: usize) -> Vec<u8> {
        (0..bank_count).flat_map(|bank| vec![bank as u8; ROM_BANK_SIZE]).collect()
    }

    fn sega_bus<B: MemoryBlock>(cartridge: &Cartridge) -> MemoryBus<B, SegaMapper> {
        let mut blocks = BlockArena::new();
        let mapper = SegaMapper::load(cartridge, &mut blocks);
        let mut bus = MemoryBus::new(blocks, PageTable::new(), mapper, UnmappedAccess::Panic);

        let (mapper, context) = bus.split_handler();
        mapper.power_on(context);

        bus
    }

    fn power_on_layout<B: MemoryBlock>() {
        let cartridge = Cartridge::new(banked_rom(8)).unwrap();
        let bus = sega_bus::<B>(&cartridge);

        assert_eq!(POWER_ON_REGISTERS, bus.paging_handler().registers());
        assert_eq!(0x00, bus.read_byte(0x0000));
        assert_eq!(0x00, bus.read_byte(0x3FFF));
        assert_eq!(0x01, bus.read_byte(0x4000));
        assert_eq!(0x01, bus.read_byte(0x7FFF));
        assert_eq!(0x02, bus.read_byte(0x8000));
        assert_eq!(0x02, bus.read_byte(0xBFFF));
        assert_eq!(0x0201, bus.read_word(0x7FFF));

        // Every page is mapped in both directions
        for page in 0..crate::memory::PAGE_COUNT {
            assert!(bus.page_table().get(MapDirection::Read, page).is_some(), "page {page}");
            assert!(bus.page_table().get(MapDirection::Write, page).is_some(), "page {page}");
        }
    }

    #[test]
    fn power_on_layout_both_backends() {
        power_on_layout::<TypedBlock>();
        power_on_layout::<ArrayBlock>();
    }

    #[test]
    fn slot_bank_switching() {
        let cartridge = Cartridge::new(banked_rom(8)).unwrap();
        let mut bus = sega_bus::<TypedBlock>(&cartridge);

        bus.write_byte(0xFFFE, 0x05);
        assert_eq!(0x05, bus.read_byte(0x4000));
        assert_eq!(0x05, bus.read_byte(0x7FFF));

        bus.write_byte(0xFFFF, 0x07);
        assert_eq!(0x07, bus.read_byte(0x8000));

        // First 1KB of slot 0 stays on bank 0
        bus.write_byte(0xFFFD, 0x03);
        assert_eq!(0x00, bus.read_byte(0x0000));
        assert_eq!(0x00, bus.read_byte(0x03FF));
        assert_eq!(0x03, bus.read_byte(0x0400));
        assert_eq!(0x03, bus.read_byte(0x3FFF));
        assert_eq!(0x0300, bus.read_word(0x03FF));

        assert_eq!([0x00, 0x03, 0x05, 0x07], bus.paging_handler().registers());
    }

    #[test]
    fn bank_numbers_wrap_to_rom_size() {
        let cartridge = Cartridge::new(banked_rom(4)).unwrap();
        let mut bus = sega_bus::<ArrayBlock>(&cartridge);

        bus.write_byte(0xFFFE, 0x06);
        assert_eq!(0x02, bus.read_byte(0x4000));

        bus.write_byte(0xFFFF, 0xFF);
        assert_eq!(0x03, bus.read_byte(0x8000));
    }

    #[test]
    fn rom_is_write_protected() {
        let cartridge = Cartridge::new(banked_rom(4)).unwrap();
        let mut bus = sega_bus::<TypedBlock>(&cartridge);

        bus.write_byte(0x0000, 0x99);
        bus.write_byte(0x4321, 0x99);
        bus.write_byte(0x8000, 0x99);

        assert_eq!(0x00, bus.read_byte(0x0000));
        assert_eq!(0x01, bus.read_byte(0x4321));
        assert_eq!(0x02, bus.read_byte(0x8000));
    }

    #[test]
    fn cartridge_ram_banks() {
        let cartridge = Cartridge::new(banked_rom(4)).unwrap();
        let mut bus = sega_bus::<TypedBlock>(&cartridge);

        bus.write_byte(0xFFFC, CARTRIDGE_RAM_ENABLE);
        assert_eq!(0x00, bus.read_byte(0x8000));
        bus.write_byte(0x8000, 0x77);
        bus.write_byte(0xBFFF, 0x66);
        assert_eq!(0x77, bus.read_byte(0x8000));
        assert_eq!(0x66, bus.read_byte(0xBFFF));

        // Second RAM bank is independent
        bus.write_byte(0xFFFC, CARTRIDGE_RAM_ENABLE | CARTRIDGE_RAM_BANK_SELECT);
        assert_eq!(0x00, bus.read_byte(0x8000));
        bus.write_byte(0x8000, 0x55);

        // Disabling RAM maps the slot 2 ROM bank back in
        bus.write_byte(0xFFFC, 0x00);
        assert_eq!(0x02, bus.read_byte(0x8000));

        let ram = bus.paging_handler().cartridge_ram(bus.blocks());
        assert_eq!(CARTRIDGE_RAM_SIZE, ram.len());
        assert_eq!(0x77, ram[0x0000]);
        assert_eq!(0x66, ram[0x3FFF]);
        assert_eq!(0x55, ram[0x4000]);
    }

    #[test]
    fn saved_cartridge_ram_is_loaded() {
        let cartridge = Cartridge::new(banked_rom(2)).unwrap().with_ram(vec![0x3A; 10]).unwrap();
        let mut bus = sega_bus::<ArrayBlock>(&cartridge);

        bus.write_byte(0xFFFC, CARTRIDGE_RAM_ENABLE);
        assert_eq!(0x3A, bus.read_byte(0x8009));
        assert_eq!(0x00, bus.read_byte(0x800A));
    }

    #[test]
    fn system_ram_is_mirrored() {
        let cartridge = Cartridge::new(banked_rom(2)).unwrap();
        let mut bus = sega_bus::<TypedBlock>(&cartridge);

        bus.write_byte(0xC123, 0x42);
        assert_eq!(0x42, bus.read_byte(0xE123));

        bus.write_byte(0xFDFF, 0x24);
        assert_eq!(0x24, bus.read_byte(0xDDFF));

        // Paging register writes are also stored in the RAM mirror
        bus.write_byte(0xFFFE, 0x01);
        assert_eq!(0x01, bus.read_byte(0xDFFE));
    }

    #[test]
    fn power_on_resets_paging_and_system_ram() {
        let cartridge = Cartridge::new(banked_rom(8)).unwrap();
        let mut bus = sega_bus::<TypedBlock>(&cartridge);

        bus.write_byte(0xFFFC, CARTRIDGE_RAM_ENABLE);
        bus.write_byte(0x8000, 0x11);
        bus.write_byte(0xFFFE, 0x06);
        bus.write_byte(0xC000, 0x22);

        let (mapper, context) = bus.split_handler();
        mapper.power_on(context);

        assert_eq!(0x01, bus.read_byte(0x4000));
        assert_eq!(0x02, bus.read_byte(0x8000));
        assert_eq!(0x00, bus.read_byte(0xC000));
        assert_eq!(0x11, bus.paging_handler().cartridge_ram(bus.blocks())[0]);
        assert_eq!(vec![0x00; SYSTEM_RAM_SIZE], bus.paging_handler().system_ram(bus.blocks()));
    }

    #[test]
    fn layout_check_rejects_malformed_block_lists() {
        let cartridge = Cartridge::new(banked_rom(4)).unwrap();
        let (mut blocks, _, mapper) = sega_bus::<TypedBlock>(&cartridge).into_parts();
        assert!(mapper.layout_consistent(&blocks));

        let mut partial_bank = mapper.clone();
        partial_bank.rom_pages.truncate(PAGES_PER_BANK + 3);
        assert!(!partial_bank.layout_consistent(&blocks));

        let mut no_rom = mapper.clone();
        no_rom.rom_pages.clear();
        assert!(!no_rom.layout_consistent(&blocks));

        let mut short_ram = mapper.clone();
        short_ram.cartridge_ram_pages.pop();
        assert!(!short_ram.layout_consistent(&blocks));

        let mut short_system_ram = mapper.clone();
        short_system_ram.system_ram_pages.pop();
        assert!(!short_system_ram.layout_consistent(&blocks));

        let mut too_many_banks = mapper.clone();
        too_many_banks.rom_pages = std::iter::repeat(mapper.rom_pages[0])
            .take((MAX_ROM_BANKS + 1) * PAGES_PER_BANK)
            .collect();
        assert!(!too_many_banks.layout_consistent(&blocks));

        // A block id beyond the arena, then a block of the wrong length
        let mut dangling = mapper.clone();
        dangling.write_sink = blocks.allocate_zeroed(PAGE_SIZE);
        assert!(!dangling.layout_consistent(&sega_bus::<TypedBlock>(&cartridge).into_parts().0));

        let mut short_block = mapper.clone();
        short_block.write_sink = blocks.allocate_zeroed(PAGE_SIZE / 2);
        assert!(!short_block.layout_consistent(&blocks));
    }

    #[test]
    fn tampered_save_state_is_rejected() {
        let cartridge = Cartridge::new(banked_rom(4)).unwrap();
        let config = BusConfig {
            storage_backend: StorageBackend::NumericArray,
            unmapped_access: UnmappedAccess::OpenBus,
        };
        let mut session = Session::<ArrayBlock>::init(config, &cartridge).unwrap();
        session.bus_mut().paging_handler_mut().rom_pages.truncate(3);

        let bytes = serialize_session(&session).unwrap();

        assert!(matches!(
            deserialize_session::<ArrayBlock>(&bytes),
            Err(SaveStateError::InvalidMapperLayout)
        ));
    }
}
