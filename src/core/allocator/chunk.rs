/*!

The header at the start of every chunk. The slots follow the header in the same allocation, at the offset computed
by `SlotGeometry`.

*/

use std::ptr::NonNull;

use crate::core::{
  allocator::geometry::SlotGeometry,
  Void,
};

#[repr(C)]
pub(crate) struct Chunk {
  /// Next chunk in whichever list (active or spare) this chunk is on.
  pub(crate) next_chunk: Option<NonNull<Chunk>>,
  first_slot           : NonNull<Void>,
}

impl Chunk {
  /// Writes a chunk header at the start of `memory`, which must be a fresh allocation of
  /// `geometry.chunk_layout`.
  #[inline(always)]
  pub(crate) unsafe fn initialize(memory: NonNull<Void>, geometry: &SlotGeometry) -> NonNull<Chunk> {
    let chunk      = memory.cast::<Chunk>();
    let first_slot = memory.add(geometry.slot_offset);

    chunk.as_ptr().write(Chunk {
      next_chunk: None,
      first_slot,
    });

    chunk
  }

  #[inline(always)]
  pub(crate) fn first_slot(&self) -> *mut Void {
    self.first_slot.as_ptr()
  }

  /// One past the last slot of the chunk.
  #[inline(always)]
  pub(crate) fn end_slot(&self, geometry: &SlotGeometry) -> *mut Void {
    // In bounds of the chunk allocation by construction.
    unsafe { self.first_slot().add(geometry.slot_region_size()) }
  }

  /// Whether `address` falls inside this chunk's slot region.
  #[inline(always)]
  pub(crate) fn contains(&self, address: usize, geometry: &SlotGeometry) -> bool {
    let first = self.first_slot() as usize;
    address >= first && address - first < geometry.slot_region_size()
  }

  /// The start of the allocation this header lives in.
  #[inline(always)]
  pub(crate) fn memory(chunk: NonNull<Chunk>) -> NonNull<Void> {
    chunk.cast::<Void>()
  }
}
