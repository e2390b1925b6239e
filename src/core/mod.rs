/*!

The allocator proper. Everything here relies on the fact that every slot handed out by a given allocator has the same
size, which is what lets allocation and deallocation be O(1).

*/

pub(crate) mod allocator;

/// A `*mut Void` is a pointer to raw, untyped memory.
pub type Void = u8;
