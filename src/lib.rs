/*!

A fixed-size block allocator. Every slot handed out by a `BlockAllocator` has the same size, so allocation and
deallocation are O(1): freed slots go on an intrusive free list, and fresh slots are carved from large chunks with a
bump cursor. See the `core::allocator` module for the details.

```
use block_pool::BlockAllocator;

let mut pool = BlockAllocator::new();
pool.init(16, 8, 4).unwrap();

let a = pool.allocate().unwrap();
let b = pool.allocate().unwrap();
unsafe { pool.deallocate(b); }

// Freed slots are reused first.
assert_eq!(pool.allocate().unwrap(), b);
unsafe { pool.deallocate(a); }
```

*/

pub mod abstractions;
mod core;

// We re-export abstractions that are meant to be used publicly.
pub use abstractions::log;

pub use crate::core::allocator::{
  AllocatorConfig,
  AllocatorError,
  AllocatorFlag,
  AllocatorFlags,
  AllocatorStatistics,
  BlockAllocator,
  ConfigurationError,
  RawMemoryProvider,
  SystemAllocator,
  TypedBlockAllocator,
  ALLOCATED_FILL,
  DEFAULT_SLOTS_PER_CHUNK,
  FREED_FILL,
};
pub use crate::core::Void;
