/*!

The intrusive free list. The link to the next free slot is stored in the first machine word of each free slot, so
the list costs nothing beyond its head pointer. Slots may be aligned to less than a word, so the link is read and
written unaligned.

*/

use std::ptr::NonNull;

use crate::core::Void;

type Link = Option<NonNull<Void>>;

pub(crate) struct FreeList {
  head: Link,
}

impl FreeList {
  pub(crate) const fn new() -> Self {
    FreeList { head: None }
  }

  #[inline(always)]
  pub(crate) fn is_empty(&self) -> bool {
    self.head.is_none()
  }

  /// Makes `slot` the new head.
  ///
  /// # Safety
  /// `slot` must point to at least one machine word of writable memory that nothing else uses until the slot is
  /// popped again or the list is cleared.
  #[inline(always)]
  pub(crate) unsafe fn push(&mut self, slot: NonNull<Void>) {
    slot.as_ptr().cast::<Link>().write_unaligned(self.head);
    self.head = Some(slot);
  }

  /// Removes and returns the head.
  #[inline(always)]
  pub(crate) fn pop(&mut self) -> Option<NonNull<Void>> {
    let slot  = self.head?;
    // Every slot on the list was pushed with a link written into it.
    self.head = unsafe { read_link(slot) };
    Some(slot)
  }

  /// Forgets every slot on the list. The slots themselves are untouched.
  #[inline(always)]
  pub(crate) fn clear(&mut self) {
    self.head = None;
  }

  /// Walks the list. O(n); for debugging checks only.
  pub(crate) fn iter(&self) -> FreeListIter<'_> {
    FreeListIter {
      next   : self.head,
      _marker: std::marker::PhantomData,
    }
  }

  /// O(n); for debugging checks only.
  pub(crate) fn contains(&self, slot: NonNull<Void>) -> bool {
    self.iter().any(|free_slot| free_slot == slot)
  }
}

#[inline(always)]
unsafe fn read_link(slot: NonNull<Void>) -> Link {
  slot.as_ptr().cast::<Link>().read_unaligned()
}

pub(crate) struct FreeListIter<'a> {
  next   : Link,
  _marker: std::marker::PhantomData<&'a FreeList>,
}

impl<'a> Iterator for FreeListIter<'a> {
  type Item = NonNull<Void>;

  fn next(&mut self) -> Option<Self::Item> {
    let slot  = self.next?;
    self.next = unsafe { read_link(slot) };
    Some(slot)
  }
}
