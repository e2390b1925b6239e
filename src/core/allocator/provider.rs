/*!

Where chunk memory comes from. `SystemAllocator` asks the global Rust allocator. Other providers can be plugged in to
account for or limit the memory a pool uses.

*/

use std::{
  alloc::{alloc, dealloc, Layout},
  ptr::NonNull,
};

use crate::core::Void;

pub trait RawMemoryProvider {
  /// Allocates a block of memory described by `layout`, or returns `None` if the request cannot be satisfied.
  fn acquire(&mut self, layout: Layout) -> Option<NonNull<Void>>;

  /// Gives a block back.
  ///
  /// # Safety
  /// `memory` must have been returned by `acquire` on this provider with the same `layout`, and must not be used
  /// afterward.
  unsafe fn release(&mut self, memory: NonNull<Void>, layout: Layout);
}

/// The global Rust allocator.
#[derive(Copy, Clone, Debug, Default)]
pub struct SystemAllocator;

impl RawMemoryProvider for SystemAllocator {
  #[inline]
  fn acquire(&mut self, layout: Layout) -> Option<NonNull<Void>> {
    if layout.size() == 0 {
      return None;
    }
    // Nonzero size checked above.
    NonNull::new(unsafe { alloc(layout) })
  }

  #[inline]
  unsafe fn release(&mut self, memory: NonNull<Void>, layout: Layout) {
    dealloc(memory.as_ptr(), layout)
  }
}
