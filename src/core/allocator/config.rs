/*!

Configuration for a `BlockAllocator`: the slot geometry plus the debug stamping flags.

*/

use std::mem::align_of;

use enumflags2::{bitflags, BitFlags};

// Constant Allocator Parameters
pub const DEFAULT_SLOTS_PER_CHUNK: usize = 256;
/// Written over a slot's bytes when it is handed out, if `AllocatorFlag::FillOnAllocate` is set.
pub const ALLOCATED_FILL: u8 = 0xCD;
/// Written over a slot's bytes when it is given back, if `AllocatorFlag::FillOnFree` is set. The first machine word
/// is then overwritten by the free list link.
pub const FREED_FILL: u8 = 0xDD;

/// Debug stamping of slot memory, useful for catching reads of uninitialized or freed slots.
#[bitflags]
#[repr(u8)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AllocatorFlag {
  /// Stamp slots with `ALLOCATED_FILL` in `allocate`
  FillOnAllocate,
  /// Stamp slots with `FREED_FILL` in `deallocate`
  FillOnFree,
}

pub type AllocatorFlags = BitFlags<AllocatorFlag, u8>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct AllocatorConfig {
  /// Bytes the client needs per slot. Rounded up to a machine word and then to `alignment`.
  pub slot_size      : usize,
  /// Must be a power of two.
  pub alignment      : usize,
  pub slots_per_chunk: usize,
  pub debug_flags    : AllocatorFlags,
}

impl AllocatorConfig {
  /// A word aligned configuration with `DEFAULT_SLOTS_PER_CHUNK` slots per chunk and no debug stamping.
  pub fn new(slot_size: usize) -> Self {
    AllocatorConfig {
      slot_size,
      alignment      : align_of::<usize>(),
      slots_per_chunk: DEFAULT_SLOTS_PER_CHUNK,
      debug_flags    : AllocatorFlags::empty(),
    }
  }

  pub fn with_alignment(mut self, alignment: usize) -> Self {
    self.alignment = alignment;
    self
  }

  pub fn with_slots_per_chunk(mut self, slots_per_chunk: usize) -> Self {
    self.slots_per_chunk = slots_per_chunk;
    self
  }

  pub fn with_debug_flags(mut self, debug_flags: impl Into<AllocatorFlags>) -> Self {
    self.debug_flags = debug_flags.into();
    self
  }
}
