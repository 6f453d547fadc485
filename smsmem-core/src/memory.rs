pub mod address;
mod block;
mod bus;
mod pagetable;

pub use address::{translate, PageAddress, PAGE_COUNT, PAGE_SIZE};
pub use block::{ArrayBlock, BlockArena, BlockId, CopyRangeError, MemoryBlock, TypedBlock};
pub use bus::{BusError, MemoryBus, NoPaging, PagingContext, PagingHandler, OPEN_BUS_VALUE};
pub use pagetable::{MapDirection, PageTable};
