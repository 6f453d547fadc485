use crate::memory::address::PAGE_COUNT;
use crate::memory::block::BlockId;
use crate::serialize;
use serde::{Deserialize, Serialize};
use smsmem_proc_macros::EnumDisplay;

/// Which of the two parallel page maps a binding or access goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumDisplay)]
pub enum MapDirection {
    Read,
    Write,
}

/// Page index -> backing block bindings, kept separately for reads and writes so that ROM pages
/// can redirect writes to a dummy block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTable {
    #[serde(
        serialize_with = "serialize::serialize_array",
        deserialize_with = "serialize::deserialize_array"
    )]
    read_map: [Option<BlockId>; PAGE_COUNT],
    #[serde(
        serialize_with = "serialize::serialize_array",
        deserialize_with = "serialize::deserialize_array"
    )]
    write_map: [Option<BlockId>; PAGE_COUNT],
}

impl PageTable {
    pub fn new() -> Self {
        Self { read_map: [None; PAGE_COUNT], write_map: [None; PAGE_COUNT] }
    }

    fn map(&self, direction: MapDirection) -> &[Option<BlockId>; PAGE_COUNT] {
        match direction {
            MapDirection::Read => &self.read_map,
            MapDirection::Write => &self.write_map,
        }
    }

    fn map_mut(&mut self, direction: MapDirection) -> &mut [Option<BlockId>; PAGE_COUNT] {
        match direction {
            MapDirection::Read => &mut self.read_map,
            MapDirection::Write => &mut self.write_map,
        }
    }

    /// Bind `page` to `block` for the given direction, replacing any previous binding.
    ///
    /// # Panics
    ///
    /// Panics if `page` is not a valid page index.
    pub fn bind(&mut self, direction: MapDirection, page: usize, block: BlockId) {
        if page >= PAGE_COUNT {
            panic!("attempted to bind {direction} page {page}, only {PAGE_COUNT} pages exist");
        }

        self.map_mut(direction)[page] = Some(block);
    }

    /// Bind `page` to `block` in both the read and the write map.
    pub fn bind_read_write(&mut self, page: usize, block: BlockId) {
        self.bind(MapDirection::Read, page, block);
        self.bind(MapDirection::Write, page, block);
    }

    /// Bind consecutive pages starting at `first_page` to the given blocks, in order.
    pub fn bind_range<I>(&mut self, direction: MapDirection, first_page: usize, blocks: I)
    where
        I: IntoIterator<Item = BlockId>,
    {
        for (page, block) in (first_page..).zip(blocks) {
            self.bind(direction, page, block);
        }
    }

    pub fn unbind(&mut self, direction: MapDirection, page: usize) {
        if let Some(binding) = self.map_mut(direction).get_mut(page) {
            *binding = None;
        }
    }

    /// Remove every binding from both maps.
    pub fn clear(&mut self) {
        self.read_map = [None; PAGE_COUNT];
        self.write_map = [None; PAGE_COUNT];
    }

    #[inline]
    pub fn get(&self, direction: MapDirection, page: usize) -> Option<BlockId> {
        self.map(direction).get(page).copied().flatten()
    }

    /// Iterate over `(page, binding)` pairs for every page in the given map.
    pub fn bindings(
        &self,
        direction: MapDirection,
    ) -> impl Iterator<Item = (usize, Option<BlockId>)> + '_ {
        self.map(direction).iter().copied().enumerate()
    }

    /// Iterate over every block id referenced by either map.
    pub fn bound_blocks(&self) -> impl Iterator<Item = BlockId> + '_ {
        self.read_map.iter().chain(self.write_map.iter()).filter_map(|&binding| binding)
    }
}

impl Default for PageTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::block::{BlockArena, MemoryBlock, TypedBlock};

    fn ids(count: usize) -> Vec<BlockId> {
        let mut arena: BlockArena<TypedBlock> = BlockArena::new();
        (0..count).map(|_| arena.allocate(TypedBlock::zeroed(1))).collect()
    }

    #[test]
    fn new_table_is_unmapped() {
        let table = PageTable::new();

        for page in 0..PAGE_COUNT {
            assert_eq!(None, table.get(MapDirection::Read, page));
            assert_eq!(None, table.get(MapDirection::Write, page));
        }
        assert_eq!(0, table.bound_blocks().count());
    }

    #[test]
    fn read_and_write_maps_are_independent() {
        let ids = ids(2);
        let mut table = PageTable::new();

        table.bind(MapDirection::Read, 5, ids[0]);
        table.bind(MapDirection::Write, 5, ids[1]);

        assert_eq!(Some(ids[0]), table.get(MapDirection::Read, 5));
        assert_eq!(Some(ids[1]), table.get(MapDirection::Write, 5));
        assert_eq!(None, table.get(MapDirection::Read, 4));
    }

    #[test]
    fn rebind_replaces_binding() {
        let ids = ids(2);
        let mut table = PageTable::new();

        table.bind_read_write(3, ids[0]);
        table.bind(MapDirection::Write, 3, ids[1]);

        assert_eq!(Some(ids[0]), table.get(MapDirection::Read, 3));
        assert_eq!(Some(ids[1]), table.get(MapDirection::Write, 3));
    }

    #[test]
    fn bind_range_and_unbind() {
        let ids = ids(4);
        let mut table = PageTable::new();

        table.bind_range(MapDirection::Read, 60, ids.iter().copied());
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(Some(id), table.get(MapDirection::Read, 60 + i));
        }

        table.unbind(MapDirection::Read, 61);
        assert_eq!(None, table.get(MapDirection::Read, 61));

        // Out of range unbind/get are no-ops
        table.unbind(MapDirection::Read, 64);
        assert_eq!(None, table.get(MapDirection::Read, 64));

        let bound: Vec<_> = table
            .bindings(MapDirection::Read)
            .filter_map(|(page, binding)| binding.map(|_| page))
            .collect();
        assert_eq!(vec![60, 62, 63], bound);

        table.clear();
        assert_eq!(0, table.bound_blocks().count());
    }

    #[test]
    #[should_panic(expected = "only 64 pages exist")]
    fn bind_out_of_range_page() {
        let ids = ids(1);
        PageTable::new().bind(MapDirection::Write, 64, ids[0]);
    }

    #[test]
    fn direction_display() {
        assert_eq!("read", MapDirection::Read.to_string());
        assert_eq!("write", MapDirection::Write.to_string());
    }
}
