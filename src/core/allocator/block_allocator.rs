/*!

The `BlockAllocator` itself. See the module documentation of `core::allocator` for an overview.

Every slot that has ever been carved from a chunk is in exactly one of three states:

 - live, owned by a client;
 - on the free list;
 - unclaimed, at or past the cursor of the current chunk.

The current chunk, when there is one, is always the head of the active list. Chunks behind it on the active list
have been carved completely. Spare chunks hold no live slots.

*/

use std::{
  fmt::{Display, Formatter},
  ptr::{null_mut, NonNull},
};

use bit_set::BitSet;

use crate::{
  core::{
    allocator::{
      chunk::Chunk,
      config::{AllocatorConfig, AllocatorFlag, AllocatorFlags, ALLOCATED_FILL, FREED_FILL},
      error::AllocatorError,
      free_list::FreeList,
      geometry::SlotGeometry,
      provider::{RawMemoryProvider, SystemAllocator},
    },
    Void,
  },
  log::{critical, debug, error, info},
};

pub struct BlockAllocator<P: RawMemoryProvider = SystemAllocator> {
  // `None` until `init`
  geometry   : Option<SlotGeometry>,
  debug_flags: AllocatorFlags,

  // Bump allocation window in the current chunk. Both null when there is no current chunk.
  cursor    : *mut Void,
  cursor_end: *mut Void,

  free_list    : FreeList,
  active_chunks: Option<NonNull<Chunk>>,
  spare_chunks : Option<NonNull<Chunk>>,

  // Bookkeeping
  active_chunk_count : usize,
  spare_chunk_count  : usize,
  live_slot_count    : usize,
  free_slot_count    : usize,
  system_acquisitions: usize,
  system_releases    : usize,

  provider: P,
}

// The allocator exclusively owns its chunks; nothing else holds the raw pointers.
unsafe impl<P: RawMemoryProvider + Send> Send for BlockAllocator<P> {}

impl BlockAllocator<SystemAllocator> {
  /// An uninitialized allocator backed by the system allocator. Call `init` before allocating.
  pub fn new() -> Self {
    BlockAllocator::with_provider(SystemAllocator)
  }

  /// An allocator backed by the system allocator, initialized with `config`.
  pub fn with_config(config: AllocatorConfig) -> Result<Self, AllocatorError> {
    let mut allocator = BlockAllocator::new();
    allocator.configure(config)?;
    Ok(allocator)
  }
}

impl Default for BlockAllocator<SystemAllocator> {
  fn default() -> Self {
    BlockAllocator::new()
  }
}

impl<P: RawMemoryProvider> BlockAllocator<P> {
  /// An uninitialized allocator that takes its chunks from `provider`.
  pub fn with_provider(provider: P) -> Self {
    BlockAllocator {
      geometry   : None,
      debug_flags: AllocatorFlags::empty(),

      cursor    : null_mut(),
      cursor_end: null_mut(),

      free_list    : FreeList::new(),
      active_chunks: None,
      spare_chunks : None,

      active_chunk_count : 0,
      spare_chunk_count  : 0,
      live_slot_count    : 0,
      free_slot_count    : 0,
      system_acquisitions: 0,
      system_releases    : 0,

      provider,
    }
  }

  // region Configuration

  /// Sets up the allocator to hand out slots of `slot_size` bytes aligned to `alignment`, carved from chunks of
  /// `slots_per_chunk` slots. If the allocator already holds chunks they are all released to the system first, so
  /// every outstanding allocation becomes invalid. No chunk is allocated until the first `allocate`.
  ///
  /// The current debug flags are kept. On error the allocator is left as it was.
  pub fn init(&mut self, slot_size: usize, alignment: usize, slots_per_chunk: usize) -> Result<(), AllocatorError> {
    self.configure(AllocatorConfig {
      slot_size,
      alignment,
      slots_per_chunk,
      debug_flags: self.debug_flags,
    })
  }

  /// Same as `init`, taking the debug flags from `config` as well.
  pub fn configure(&mut self, config: AllocatorConfig) -> Result<(), AllocatorError> {
    let geometry = SlotGeometry::new(&config)?;

    let chunk_count = self.active_chunk_count + self.spare_chunk_count;
    if chunk_count > 0 {
      info!(4, "Reinitializing allocator; releasing {} chunks.", chunk_count);
    }
    self.reset();

    self.geometry    = Some(geometry);
    self.debug_flags = config.debug_flags;

    Ok(())
  }

  #[inline(always)]
  pub fn debug_flags(&self) -> AllocatorFlags {
    self.debug_flags
  }

  pub fn set_debug_flags(&mut self, debug_flags: impl Into<AllocatorFlags>) {
    self.debug_flags = debug_flags.into();
  }

  #[inline(always)]
  pub fn is_initialized(&self) -> bool {
    self.geometry.is_some()
  }

  /// Bytes reserved per slot, after rounding. Zero before `init`.
  #[inline(always)]
  pub fn slot_size(&self) -> usize {
    self.geometry.map_or(0, |geometry| geometry.slot_size)
  }

  /// The slot size passed to `init`. Zero before `init`.
  #[inline(always)]
  pub fn requested_slot_size(&self) -> usize {
    self.geometry.map_or(0, |geometry| geometry.requested_slot_size)
  }

  /// Zero before `init`.
  #[inline(always)]
  pub fn alignment(&self) -> usize {
    self.geometry.map_or(0, |geometry| geometry.alignment)
  }

  /// Zero before `init`.
  #[inline(always)]
  pub fn slots_per_chunk(&self) -> usize {
    self.geometry.map_or(0, |geometry| geometry.slots_per_chunk)
  }

  /// Size of one chunk allocation, header included. Zero before `init`.
  #[inline(always)]
  pub fn chunk_byte_size(&self) -> usize {
    self.geometry.map_or(0, |geometry| geometry.chunk_byte_size())
  }

  /// The source of chunk memory.
  pub fn provider(&self) -> &P {
    &self.provider
  }

  // endregion Configuration

  // region Allocation

  /// Hands out a slot. Freed slots are reused first, then the current chunk is carved, and only then is a chunk
  /// taken from the spare list or, failing that, from the system allocator.
  ///
  /// The slot's contents are unspecified unless `AllocatorFlag::FillOnAllocate` is set.
  #[inline]
  pub fn allocate(&mut self) -> Result<NonNull<Void>, AllocatorError> {
    let slot_size = match &self.geometry {
      Some(geometry) => geometry.slot_size,
      None => return Err(AllocatorError::NotInitialized),
    };

    let slot = if let Some(slot) = self.free_list.pop() {
      self.free_slot_count -= 1;
      slot
    } else if self.cursor != self.cursor_end {
      let slot = self.cursor;
      // The window always spans whole slots, so this lands at most on `cursor_end`.
      self.cursor = unsafe { self.cursor.add(slot_size) };
      unsafe { NonNull::new_unchecked(slot) }
    } else {
      self.allocate_from_new_chunk()?
    };

    self.live_slot_count += 1;

    if self.debug_flags.contains(AllocatorFlag::FillOnAllocate) {
      unsafe { slot.as_ptr().write_bytes(ALLOCATED_FILL, slot_size); }
    }

    Ok(slot)
  }

  /// Makes a chunk current and returns its first slot. Called when the free list is empty and the current chunk,
  /// if any, is exhausted.
  #[cold]
  fn allocate_from_new_chunk(&mut self) -> Result<NonNull<Void>, AllocatorError> {
    let geometry = self.geometry.ok_or(AllocatorError::NotInitialized)?;

    #[cfg(feature = "pool_debug")]
    {
      eprintln!("allocate_from_new_chunk()");
      self.dump_memory_variables();
      assert!(self.check_invariant(), "allocator invariant violated before acquiring a chunk");
    }

    let chunk = match self.spare_chunks {
      Some(spare) => {
        self.spare_chunks       = unsafe { spare.as_ref().next_chunk };
        self.spare_chunk_count -= 1;
        debug!(5, "Reusing spare chunk at {:p}.", spare.as_ptr());
        spare
      }
      None => self.acquire_chunk(&geometry)?,
    };

    let chunk_mut = unsafe { &mut *chunk.as_ptr() };
    chunk_mut.next_chunk     = self.active_chunks;
    self.active_chunks       = Some(chunk);
    self.active_chunk_count += 1;

    let first_slot  = chunk_mut.first_slot();
    // A chunk holds at least one slot.
    self.cursor     = unsafe { first_slot.add(geometry.slot_size) };
    self.cursor_end = chunk_mut.end_slot(&geometry);

    Ok(unsafe { NonNull::new_unchecked(first_slot) })
  }

  /// Gets a fresh chunk from the provider. Nothing is linked in on failure.
  fn acquire_chunk(&mut self, geometry: &SlotGeometry) -> Result<NonNull<Chunk>, AllocatorError> {
    let bytes_requested = geometry.chunk_byte_size();

    let Some(memory) = self.provider.acquire(geometry.chunk_layout) else {
      error!(1, "The system allocator could not provide a chunk of {} bytes.", bytes_requested);
      return Err(AllocatorError::OutOfMemory { bytes_requested });
    };

    self.system_acquisitions += 1;
    debug!(4, "Acquired a chunk of {} bytes at {:p}.", bytes_requested, memory.as_ptr());

    Ok(unsafe { Chunk::initialize(memory, geometry) })
  }

  /// Gives a slot back to the allocator. O(1).
  ///
  /// # Safety
  /// `slot` must be a live allocation returned by `allocate` on this allocator, not deallocated since, and must not
  /// be used afterward. Debug builds check that `slot` was handed out by this allocator and panic if not; release
  /// builds do not check.
  #[inline]
  pub unsafe fn deallocate(&mut self, slot: NonNull<Void>) {
    debug_assert!(
      self.is_valid_allocation(slot.as_ptr()),
      "deallocate: {:p} was not allocated by this allocator",
      slot.as_ptr()
    );
    #[cfg(feature = "pool_debug")]
    assert!(!self.free_list.contains(slot), "deallocate: {:p} is already free", slot.as_ptr());

    if self.debug_flags.contains(AllocatorFlag::FillOnFree) {
      if let Some(geometry) = &self.geometry {
        slot.as_ptr().write_bytes(FREED_FILL, geometry.slot_size);
      }
    }

    self.free_list.push(slot);
    self.free_slot_count += 1;
    self.live_slot_count -= 1;
  }

  /// Whether `slot` is the start of a slot this allocator has handed out since the last `deallocate_all`: it lies in
  /// the slot region of an active chunk, on a slot boundary, and below that chunk's cursor. Slots that have since
  /// been deallocated still count; see `is_live_allocation`.
  ///
  /// Walks the active chunk list, so this is not O(1). Meant for assertions.
  pub fn is_valid_allocation(&self, slot: *const Void) -> bool {
    let Some(geometry) = &self.geometry else {
      return false;
    };
    let address = slot as usize;

    let mut maybe_chunk = self.active_chunks;
    let mut is_current  = true;

    while let Some(chunk) = maybe_chunk {
      let chunk_ref = unsafe { chunk.as_ref() };

      if chunk_ref.contains(address, geometry) {
        let handed_out_end = match is_current {
          true  => self.cursor as usize,
          false => chunk_ref.end_slot(geometry) as usize,
        };
        let offset = address - chunk_ref.first_slot() as usize;

        return address < handed_out_end && offset % geometry.slot_size == 0;
      }

      is_current  = false;
      maybe_chunk = chunk_ref.next_chunk;
    }

    false
  }

  /// `is_valid_allocation`, and additionally not on the free list. O(live chunks + free slots).
  pub fn is_live_allocation(&self, slot: *const Void) -> bool {
    match NonNull::new(slot as *mut Void) {
      Some(slot) => self.is_valid_allocation(slot.as_ptr()) && !self.free_list.contains(slot),
      None => false,
    }
  }

  // endregion Allocation

  // region Bulk deallocation

  /// Invalidates every allocation at once. All chunks move to the spare list and keep their memory, so the next
  /// `slots_per_chunk` allocations per chunk are served without calling the system allocator.
  pub fn deallocate_all(&mut self) {
    if let Some(first_active) = self.active_chunks {
      // Splice the whole active list onto the front of the spare list.
      let mut tail = first_active;
      unsafe {
        while let Some(next) = tail.as_ref().next_chunk {
          tail = next;
        }
        (*tail.as_ptr()).next_chunk = self.spare_chunks;
      }

      debug!(4, "Retiring {} active chunks to the spare list.", self.active_chunk_count);
      self.spare_chunks       = Some(first_active);
      self.spare_chunk_count += self.active_chunk_count;
    }

    self.active_chunks      = None;
    self.active_chunk_count = 0;
    self.free_list.clear();
    self.free_slot_count    = 0;
    self.live_slot_count    = 0;
    self.cursor             = null_mut();
    self.cursor_end         = null_mut();

    #[cfg(feature = "pool_debug")]
    assert!(self.check_invariant(), "allocator invariant violated after deallocate_all");
  }

  /// Invalidates every allocation and gives every chunk back to the system allocator. The configuration is kept, so
  /// the allocator can be used again right away. Calling `reset` twice is the same as calling it once.
  pub fn reset(&mut self) {
    self.deallocate_all();

    // Without a geometry no chunk was ever acquired.
    let Some(geometry) = self.geometry else {
      return;
    };

    let released = self.spare_chunk_count;
    while let Some(chunk) = self.spare_chunks {
      unsafe {
        self.spare_chunks = chunk.as_ref().next_chunk;
        self.provider.release(Chunk::memory(chunk), geometry.chunk_layout);
      }
      self.system_releases += 1;
    }
    self.spare_chunk_count = 0;

    if released > 0 {
      info!(
        4,
        "Released {} chunks ({} bytes) to the system allocator.",
        released,
        released * geometry.chunk_byte_size()
      );
    }
  }

  // endregion Bulk deallocation

  // region Diagnostics

  pub fn statistics(&self) -> AllocatorStatistics {
    AllocatorStatistics {
      active_chunks      : self.active_chunk_count,
      spare_chunks       : self.spare_chunk_count,
      live_slots         : self.live_slot_count,
      free_slots         : self.free_slot_count,
      bytes_reserved     : (self.active_chunk_count + self.spare_chunk_count) * self.chunk_byte_size(),
      system_acquisitions: self.system_acquisitions,
      system_releases    : self.system_releases,
    }
  }

  /// Verifies the slot bookkeeping: the chunk lists have the recorded lengths, every free list entry is a handed
  /// out slot of an active chunk and appears once, and handed out slots minus free slots equals the live count.
  /// Violations are logged. O(total slots); for debugging only.
  pub fn check_invariant(&self) -> bool {
    let Some(geometry) = &self.geometry else {
      return self.active_chunks.is_none() && self.spare_chunks.is_none() && self.free_list.is_empty();
    };
    let mut valid = true;

    // (first slot address, handed out slot count) per active chunk, current chunk first.
    let mut regions: Vec<(usize, usize)> = Vec::with_capacity(self.active_chunk_count);
    let mut maybe_chunk = self.active_chunks;
    while let Some(chunk) = maybe_chunk {
      let chunk_ref = unsafe { chunk.as_ref() };
      let first     = chunk_ref.first_slot() as usize;
      let carved    = match regions.is_empty() {
        true  => (self.cursor as usize - first) / geometry.slot_size,
        false => geometry.slots_per_chunk,
      };
      regions.push((first, carved));
      maybe_chunk = chunk_ref.next_chunk;
    }

    if regions.len() != self.active_chunk_count {
      critical!(1, "Active chunk list has {} chunks but {} are recorded.", regions.len(), self.active_chunk_count);
      valid = false;
    }

    let mut spare_count = 0;
    let mut maybe_chunk = self.spare_chunks;
    while let Some(chunk) = maybe_chunk {
      spare_count += 1;
      maybe_chunk  = unsafe { chunk.as_ref().next_chunk };
    }
    if spare_count != self.spare_chunk_count {
      critical!(1, "Spare chunk list has {} chunks but {} are recorded.", spare_count, self.spare_chunk_count);
      valid = false;
    }

    let mut seen       = BitSet::with_capacity(regions.len() * geometry.slots_per_chunk);
    let mut free_count = 0;
    for slot in self.free_list.iter() {
      let address  = slot.as_ptr() as usize;
      let position = regions
          .iter()
          .enumerate()
          .find_map(|(chunk_index, &(first, carved))| {
            let offset = address.checked_sub(first)?;
            let index  = offset / geometry.slot_size;
            match offset % geometry.slot_size == 0 && index < carved {
              true  => Some(chunk_index * geometry.slots_per_chunk + index),
              false => None,
            }
          });

      // Stop walking on the first bad entry; the rest of the list cannot be trusted.
      match position {
        None => {
          critical!(1, "Free slot {:p} is not a handed out slot of an active chunk.", slot.as_ptr());
          return false;
        }
        Some(position) if !seen.insert(position) => {
          critical!(1, "Free slot {:p} is on the free list more than once.", slot.as_ptr());
          return false;
        }
        Some(_) => free_count += 1,
      }
    }

    if free_count != self.free_slot_count {
      critical!(1, "Free list has {} slots but {} are recorded.", free_count, self.free_slot_count);
      valid = false;
    }

    let handed_out: usize = regions.iter().map(|&(_, carved)| carved).sum();
    if handed_out - free_count != self.live_slot_count {
      critical!(
        1,
        "{} slots handed out and {} free, but {} are recorded as live.",
        handed_out,
        free_count,
        self.live_slot_count
      );
      valid = false;
    }

    valid
  }

  /// Prints the state of the allocator.
  #[cfg(feature = "pool_debug")]
  pub fn dump_memory_variables(&self) {
    eprintln!("╭─────────────────────────────────────────────╮");
    eprintln!("│{:<32} {:>12}│", "Variable", "Value");
    eprintln!("├─────────────────────────────────────────────┤");
    eprintln!("│{:<32} {:>12}│", "slot_size", self.slot_size());
    eprintln!("│{:<32} {:>12}│", "slots_per_chunk", self.slots_per_chunk());
    eprintln!("│{:<32} {:>12}│", "chunk_byte_size", self.chunk_byte_size());
    eprintln!("│{:<32} {:>12}│", "active_chunk_count", self.active_chunk_count);
    eprintln!("│{:<32} {:>12}│", "spare_chunk_count", self.spare_chunk_count);
    eprintln!("│{:<32} {:>12}│", "live_slot_count", self.live_slot_count);
    eprintln!("│{:<32} {:>12}│", "free_slot_count", self.free_slot_count);
    eprintln!("│{:<32} {:>12}│", "system_acquisitions", self.system_acquisitions);
    eprintln!("│{:<32} {:>12}│", "system_releases", self.system_releases);
    eprintln!("│{:<32} {:>12p}│", "cursor", self.cursor);
    eprintln!("│{:<32} {:>12p}│", "cursor_end", self.cursor_end);
    eprintln!(
      "│{:<32} {:>12p}│",
      "free_list",
      self.free_list.iter().next().map_or(null_mut(), |slot| slot.as_ptr())
    );
    eprintln!(
      "│{:<32} {:>12p}│",
      "active_chunks",
      self.active_chunks.map_or(null_mut(), |chunk| chunk.as_ptr())
    );
    eprintln!(
      "│{:<32} {:>12p}│",
      "spare_chunks",
      self.spare_chunks.map_or(null_mut(), |chunk| chunk.as_ptr())
    );
    eprintln!("╰─────────────────────────────────────────────╯");
  }

  // endregion Diagnostics
}

impl<P: RawMemoryProvider> Drop for BlockAllocator<P> {
  fn drop(&mut self) {
    self.reset();
  }
}


/// A snapshot of an allocator's bookkeeping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct AllocatorStatistics {
  pub active_chunks      : usize,
  pub spare_chunks       : usize,
  pub live_slots         : usize,
  pub free_slots         : usize,
  /// Chunk memory currently held, active and spare.
  pub bytes_reserved     : usize,
  /// Chunks obtained from the system over the allocator's lifetime.
  pub system_acquisitions: usize,
  /// Chunks given back to the system over the allocator's lifetime.
  pub system_releases    : usize,
}

impl Display for AllocatorStatistics {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    writeln!(
      f,
      "{:<10} {:<10} {:<10} {:<10} {:<13} {:<10} {:<10}",
      "Active",
      "Spare",
      "Live",
      "Free",
      "Reserved (MB)",
      "Acquired",
      "Released"
    )?;
    write!(
      f,
      "{:<10} {:<10} {:<10} {:<10} {:<13.2} {:<10} {:<10}",
      self.active_chunks,
      self.spare_chunks,
      self.live_slots,
      self.free_slots,
      (self.bytes_reserved as f64) / (1024.0 * 1024.0),
      self.system_acquisitions,
      self.system_releases,
    )
  }
}
