//
// Address space geometry
//

/// Number of address bits consumed by the intra-page offset.
pub const PAGE_SHIFT: u32 = 10;

pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

pub const PAGE_COUNT: usize = 1 << (16 - PAGE_SHIFT);

pub const OFFSET_MASK: u16 = (PAGE_SIZE - 1) as u16;

/// Offset of the final byte in a page; a word read starting here straddles two pages.
pub const LAST_PAGE_OFFSET: usize = PAGE_SIZE - 1;

//
// Paging registers
//

pub const PAGING_REGISTERS_START: u16 = 0xFFFC;
pub const PAGING_REGISTERS_END: u16 = 0xFFFF;

pub const PAGING_REGISTER_MASK: u16 = 0x0003;

/// A 16-bit bus address split into its page index and the offset within that page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAddress {
    pub page: usize,
    pub offset: usize,
}

impl PageAddress {
    /// Whether a 16-bit access starting at this address crosses into the next page.
    #[inline]
    pub fn is_page_split(self) -> bool {
        self.offset == LAST_PAGE_OFFSET
    }
}

#[inline]
pub fn translate(address: u16) -> PageAddress {
    PageAddress {
        page: usize::from(address >> PAGE_SHIFT),
        offset: usize::from(address & OFFSET_MASK),
    }
}

/// Return the paging register index (0-3) written by the given address, if it is one.
#[inline]
pub fn paging_register(address: u16) -> Option<u8> {
    (PAGING_REGISTERS_START..=PAGING_REGISTERS_END)
        .contains(&address)
        .then_some((address & PAGING_REGISTER_MASK) as u8)
}

/// First address covered by the given page.
pub fn page_start(page: usize) -> u16 {
    (page << PAGE_SHIFT) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translate_full_address_space() {
        for address in 0..=u16::MAX {
            let PageAddress { page, offset } = translate(address);
            assert_eq!(usize::from(address >> 10), page);
            assert_eq!(usize::from(address & 0x3FF), offset);
            assert!(page < PAGE_COUNT);
            assert!(offset <= LAST_PAGE_OFFSET);
        }
    }

    #[test]
    fn page_split_only_at_last_byte() {
        assert!(!translate(0x0000).is_page_split());
        assert!(!translate(0x03FE).is_page_split());
        assert!(translate(0x03FF).is_page_split());
        assert!(translate(0x7FFF).is_page_split());
        assert!(translate(0xFFFF).is_page_split());
        assert!(!translate(0x0400).is_page_split());
    }

    #[test]
    fn paging_register_range() {
        assert_eq!(None, paging_register(0x0000));
        assert_eq!(None, paging_register(0xDFFC));
        assert_eq!(None, paging_register(0xFFFB));
        assert_eq!(Some(0), paging_register(0xFFFC));
        assert_eq!(Some(1), paging_register(0xFFFD));
        assert_eq!(Some(2), paging_register(0xFFFE));
        assert_eq!(Some(3), paging_register(0xFFFF));
    }

    #[test]
    fn page_start_addresses() {
        assert_eq!(0x0000, page_start(0));
        assert_eq!(0x0400, page_start(1));
        assert_eq!(0xC000, page_start(48));
        assert_eq!(0xFC00, page_start(63));
    }
}
