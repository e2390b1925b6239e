/*!

# Block Allocator

A pool of same-sized slots. Memory comes from the system in large _chunks_, each of which holds a fixed number of
slots behind a small header. A `BlockAllocator` keeps three things:

 1. A bump cursor into the chunk it is currently carving up. Fresh slots are handed out by advancing the cursor.
 2. An intrusive free list of slots that clients gave back. The link to the next free slot is stored in the first
    machine word of the free slot itself, so the list needs no memory of its own.
 3. Two singly linked lists of chunks. _Active_ chunks have been visited by the cursor and may hold live
    allocations. _Spare_ chunks were retired by `deallocate_all` and can be reused without asking the system for
    memory.

Allocation tries the free list first, then the cursor, and only when both are exhausted takes a chunk, preferring a
spare one over a fresh system allocation. Deallocation pushes the slot onto the free list. Nothing is ever searched,
and since all slots have the same size there is nothing to coalesce.

`deallocate_all` is a fast reset: every chunk becomes spare, so a subsequent burst of allocations reuses the same
memory. `reset` additionally gives every chunk back to the system.

The allocator is not synchronized. It is meant to be owned by one subsystem and used from one thread.

*/

mod block_allocator;
mod chunk;
mod config;
mod error;
mod free_list;
mod geometry;
mod provider;
mod typed;

#[cfg(test)]
mod tests;

pub use block_allocator::{AllocatorStatistics, BlockAllocator};
pub use config::{
  AllocatorConfig,
  AllocatorFlag,
  AllocatorFlags,
  ALLOCATED_FILL,
  DEFAULT_SLOTS_PER_CHUNK,
  FREED_FILL,
};
pub use error::{AllocatorError, ConfigurationError};
pub use provider::{RawMemoryProvider, SystemAllocator};
pub use typed::TypedBlockAllocator;
