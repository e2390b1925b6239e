/*!

Slot and chunk layout arithmetic. A chunk is laid out as

```text
| Chunk header | padding | slot 0 | slot 1 | ... | slot (slots_per_chunk - 1) |
^ chunk_layout.align()   ^ slot_offset, aligned to `alignment`
```

and every slot is `slot_size` bytes, a multiple of `alignment`, so every slot is aligned.

*/

use std::{
  alloc::Layout,
  mem::{align_of, size_of},
};

use crate::core::allocator::{
  chunk::Chunk,
  config::AllocatorConfig,
  error::ConfigurationError,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) struct SlotGeometry {
  /// The size asked for by the client.
  pub(crate) requested_slot_size: usize,
  /// The size actually reserved per slot.
  pub(crate) slot_size          : usize,
  pub(crate) alignment          : usize,
  pub(crate) slots_per_chunk    : usize,
  /// Offset of slot 0 from the start of the chunk.
  pub(crate) slot_offset        : usize,
  pub(crate) chunk_layout       : Layout,
}

impl SlotGeometry {
  pub(crate) fn new(config: &AllocatorConfig) -> Result<SlotGeometry, ConfigurationError> {
    let AllocatorConfig { slot_size: requested_slot_size, alignment, slots_per_chunk, .. } = *config;

    if requested_slot_size == 0 {
      return Err(ConfigurationError::ZeroSlotSize);
    }
    if !alignment.is_power_of_two() {
      return Err(ConfigurationError::AlignmentNotPowerOfTwo { alignment });
    }
    if slots_per_chunk == 0 {
      return Err(ConfigurationError::ZeroSlotsPerChunk);
    }

    let too_large = ConfigurationError::ChunkTooLarge { slot_size: requested_slot_size, slots_per_chunk };

    // A free slot has to hold the free list link.
    let slot_size   = round_up(requested_slot_size.max(size_of::<usize>()), alignment).ok_or(too_large)?;
    let slot_offset = round_up(size_of::<Chunk>(), alignment).ok_or(too_large)?;
    let chunk_size  = slot_size
        .checked_mul(slots_per_chunk)
        .and_then(|slot_bytes| slot_bytes.checked_add(slot_offset))
        .ok_or(too_large)?;
    let chunk_layout = Layout::from_size_align(chunk_size, alignment.max(align_of::<Chunk>()))
        .map_err(|_| too_large)?;

    Ok(SlotGeometry {
      requested_slot_size,
      slot_size,
      alignment,
      slots_per_chunk,
      slot_offset,
      chunk_layout,
    })
  }

  /// Bytes occupied by the slots of one chunk.
  #[inline(always)]
  pub(crate) fn slot_region_size(&self) -> usize {
    self.slot_size * self.slots_per_chunk
  }

  #[inline(always)]
  pub(crate) fn chunk_byte_size(&self) -> usize {
    self.chunk_layout.size()
  }
}

/// Rounds `value` up to a multiple of `alignment`, which must be a power of two. `None` on overflow.
#[inline(always)]
fn round_up(value: usize, alignment: usize) -> Option<usize> {
  let mask = alignment - 1;
  value.checked_add(mask).map(|padded| padded & !mask)
}
