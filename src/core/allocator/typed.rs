/*!

A `BlockAllocator` sized and aligned for values of one type. Values are moved into slots with `insert` and moved back
out with `remove` or dropped in place with `destroy`.

`deallocate_all` and `reset` invalidate every slot without running destructors; values still live at that point are
leaked, exactly as if they had been passed to `std::mem::forget`.

*/

use std::{
  marker::PhantomData,
  mem::{align_of, size_of},
  ptr::NonNull,
};

use crate::core::allocator::{
  block_allocator::{AllocatorStatistics, BlockAllocator},
  error::AllocatorError,
  provider::{RawMemoryProvider, SystemAllocator},
};

pub struct TypedBlockAllocator<T, P: RawMemoryProvider = SystemAllocator> {
  slots  : BlockAllocator<P>,
  _marker: PhantomData<T>,
}

impl<T> TypedBlockAllocator<T, SystemAllocator> {
  pub fn new(slots_per_chunk: usize) -> Result<Self, AllocatorError> {
    TypedBlockAllocator::with_provider(slots_per_chunk, SystemAllocator)
  }
}

impl<T, P: RawMemoryProvider> TypedBlockAllocator<T, P> {
  pub fn with_provider(slots_per_chunk: usize, provider: P) -> Result<Self, AllocatorError> {
    let mut slots = BlockAllocator::with_provider(provider);
    // Zero sized types still get a distinct slot each.
    slots.init(size_of::<T>().max(1), align_of::<T>(), slots_per_chunk)?;

    Ok(TypedBlockAllocator {
      slots,
      _marker: PhantomData,
    })
  }

  /// Moves `value` into a fresh slot. On failure `value` is dropped.
  #[inline]
  pub fn insert(&mut self, value: T) -> Result<NonNull<T>, AllocatorError> {
    let slot = self.slots.allocate()?.cast::<T>();
    // Slots are sized and aligned for `T`.
    unsafe { slot.as_ptr().write(value); }
    Ok(slot)
  }

  /// Moves the value out of its slot and frees the slot.
  ///
  /// # Safety
  /// `value` must have been returned by `insert` on this allocator, and not removed, destroyed, or invalidated by
  /// `deallocate_all` or `reset` since.
  #[inline]
  pub unsafe fn remove(&mut self, value: NonNull<T>) -> T {
    let moved = value.as_ptr().read();
    self.slots.deallocate(value.cast());
    moved
  }

  /// Drops the value in place and frees its slot.
  ///
  /// # Safety
  /// Same as `remove`.
  #[inline]
  pub unsafe fn destroy(&mut self, value: NonNull<T>) {
    value.as_ptr().drop_in_place();
    self.slots.deallocate(value.cast());
  }

  /// Whether `value` points at a value inserted and not yet removed. Not O(1).
  pub fn contains(&self, value: NonNull<T>) -> bool {
    self.slots.is_live_allocation(value.as_ptr().cast())
  }

  /// Invalidates every value without dropping it. Chunk memory is kept for reuse.
  pub fn deallocate_all(&mut self) {
    self.slots.deallocate_all();
  }

  /// Invalidates every value without dropping it and gives all memory back to the system.
  pub fn reset(&mut self) {
    self.slots.reset();
  }

  #[inline(always)]
  pub fn len(&self) -> usize {
    self.slots.statistics().live_slots
  }

  #[inline(always)]
  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn statistics(&self) -> AllocatorStatistics {
    self.slots.statistics()
  }

  /// The untyped allocator underneath.
  pub fn as_block_allocator(&self) -> &BlockAllocator<P> {
    &self.slots
  }
}
