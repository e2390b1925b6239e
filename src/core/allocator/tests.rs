use std::{
  alloc::Layout,
  cell::Cell,
  collections::HashMap,
  mem::size_of,
  ptr::NonNull,
  rc::Rc,
};

use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::core::{
  allocator::*,
  Void,
};

// region Test provider

#[derive(Default)]
struct ProviderCounters {
  acquisitions: Cell<usize>,
  releases    : Cell<usize>,
  failing     : Cell<bool>,
}

/// The system allocator with call counting and injectable failure.
#[derive(Clone, Default)]
struct CountingProvider {
  counters: Rc<ProviderCounters>,
}

impl CountingProvider {
  fn acquisitions(&self) -> usize {
    self.counters.acquisitions.get()
  }

  fn releases(&self) -> usize {
    self.counters.releases.get()
  }

  fn outstanding(&self) -> usize {
    self.acquisitions() - self.releases()
  }

  fn set_failing(&self, failing: bool) {
    self.counters.failing.set(failing);
  }
}

impl RawMemoryProvider for CountingProvider {
  fn acquire(&mut self, layout: Layout) -> Option<NonNull<Void>> {
    if self.counters.failing.get() {
      return None;
    }
    let memory = SystemAllocator.acquire(layout)?;
    self.counters.acquisitions.set(self.acquisitions() + 1);
    Some(memory)
  }

  unsafe fn release(&mut self, memory: NonNull<Void>, layout: Layout) {
    self.counters.releases.set(self.releases() + 1);
    SystemAllocator.release(memory, layout);
  }
}

fn counting_allocator(slot_size: usize, alignment: usize, slots_per_chunk: usize) -> BlockAllocator<CountingProvider> {
  let mut allocator = BlockAllocator::with_provider(CountingProvider::default());
  allocator.init(slot_size, alignment, slots_per_chunk).unwrap();
  allocator
}

// endregion Test provider

#[test]
fn test_lifo_reuse_and_growth_scenario() {
  let mut pool = counting_allocator(16, 8, 4);
  assert_eq!(pool.provider().acquisitions(), 0, "no chunk is allocated eagerly");

  let a = pool.allocate().unwrap();
  let b = pool.allocate().unwrap();
  let c = pool.allocate().unwrap();
  let d = pool.allocate().unwrap();
  assert_eq!(pool.provider().acquisitions(), 1);

  // Fresh slots are carved in address order from one chunk.
  for (index, slot) in [a, b, c, d].iter().enumerate() {
    assert_eq!(slot.as_ptr() as usize, a.as_ptr() as usize + index * 16);
  }

  unsafe {
    pool.deallocate(b);
    pool.deallocate(c);
  }
  assert_eq!(pool.allocate().unwrap(), c);
  assert_eq!(pool.allocate().unwrap(), b);
  assert_eq!(pool.provider().acquisitions(), 1);

  let e = pool.allocate().unwrap();
  assert_eq!(pool.provider().acquisitions(), 2);
  assert!(![a, b, c, d].contains(&e));
  assert!(pool.check_invariant());
}

#[test]
fn test_deallocated_slot_is_reused_first() {
  let mut pool = counting_allocator(32, 8, 16);
  let slots: Vec<_> = (0..5).map(|_| pool.allocate().unwrap()).collect();

  unsafe { pool.deallocate(slots[2]); }
  assert_eq!(pool.allocate().unwrap(), slots[2]);
}

#[test]
fn test_exhaustion_acquires_exactly_one_chunk() {
  let slots_per_chunk = 8;
  let mut pool = counting_allocator(24, 8, slots_per_chunk);

  for _ in 0..slots_per_chunk {
    pool.allocate().unwrap();
  }
  assert_eq!(pool.provider().acquisitions(), 1);

  pool.allocate().unwrap();
  assert_eq!(pool.provider().acquisitions(), 2);
  assert_eq!(pool.statistics().active_chunks, 2);
  assert_eq!(pool.statistics().live_slots, slots_per_chunk + 1);
}

#[test]
fn test_deallocate_all_retains_chunks() {
  let slots_per_chunk = 4;
  let mut pool = counting_allocator(16, 8, slots_per_chunk);

  for _ in 0..2 * slots_per_chunk {
    pool.allocate().unwrap();
  }
  assert_eq!(pool.provider().acquisitions(), 2);

  pool.deallocate_all();
  let statistics = pool.statistics();
  assert_eq!(statistics.active_chunks, 0);
  assert_eq!(statistics.spare_chunks, 2);
  assert_eq!(statistics.live_slots, 0);
  assert_eq!(statistics.free_slots, 0);
  assert_eq!(statistics.bytes_reserved, 2 * pool.chunk_byte_size());
  assert!(pool.check_invariant());

  // Both spare chunks are used up before the system is asked again.
  for _ in 0..2 * slots_per_chunk {
    pool.allocate().unwrap();
  }
  assert_eq!(pool.provider().acquisitions(), 2);
  assert_eq!(pool.provider().releases(), 0);

  pool.allocate().unwrap();
  assert_eq!(pool.provider().acquisitions(), 3);
  assert!(pool.check_invariant());
}

#[test]
fn test_deallocate_all_forgets_freed_slots() {
  let mut pool = counting_allocator(16, 8, 4);
  let a = pool.allocate().unwrap();
  let b = pool.allocate().unwrap();
  unsafe { pool.deallocate(b); }

  pool.deallocate_all();
  assert!(!pool.is_valid_allocation(a.as_ptr()));

  // The spare chunk is carved from the start again rather than popping `b`.
  assert_eq!(pool.allocate().unwrap(), a);
  assert_eq!(pool.allocate().unwrap(), b);
}

#[test]
fn test_reset_is_idempotent() {
  let mut pool = counting_allocator(16, 8, 4);
  for _ in 0..9 {
    pool.allocate().unwrap();
  }
  pool.deallocate_all();
  pool.allocate().unwrap();

  pool.reset();
  let after_one_reset = pool.statistics();
  assert_eq!(pool.provider().outstanding(), 0);
  assert_eq!(pool.provider().releases(), 3);
  assert_eq!(after_one_reset.active_chunks, 0);
  assert_eq!(after_one_reset.spare_chunks, 0);
  assert_eq!(after_one_reset.bytes_reserved, 0);

  pool.reset();
  assert_eq!(pool.statistics(), after_one_reset);
  assert_eq!(pool.provider().releases(), 3);
  assert!(pool.check_invariant());
}

#[test]
fn test_reset_allocator_behaves_like_fresh_one() {
  let mut used  = counting_allocator(40, 16, 3);
  let mut fresh = counting_allocator(40, 16, 3);

  for _ in 0..7 {
    used.allocate().unwrap();
  }
  used.reset();
  let acquisitions_before = used.provider().acquisitions();

  let used_slots : Vec<_> = (0..4).map(|_| used.allocate().unwrap()).collect();
  let fresh_slots: Vec<_> = (0..4).map(|_| fresh.allocate().unwrap()).collect();

  assert_eq!(used.provider().acquisitions() - acquisitions_before, fresh.provider().acquisitions());
  assert_eq!(used.slot_size(), fresh.slot_size());
  for slots in [&used_slots, &fresh_slots] {
    // Three slots from the first chunk in order, the fourth from a new chunk.
    assert_eq!(slots[1].as_ptr() as usize - slots[0].as_ptr() as usize, 48);
    assert_eq!(slots[2].as_ptr() as usize - slots[1].as_ptr() as usize, 48);
    assert!(slots.iter().all(|slot| slot.as_ptr() as usize % 16 == 0));
  }
}

#[test]
fn test_round_trip_leaves_next_allocation_unchanged() {
  let mut pool = counting_allocator(16, 8, 4);
  let _held = [pool.allocate().unwrap(), pool.allocate().unwrap()];
  let freed = pool.allocate().unwrap();
  unsafe { pool.deallocate(freed); }
  let statistics = pool.statistics();

  for _ in 0..100 {
    let slot = pool.allocate().unwrap();
    assert_eq!(slot, freed);
    unsafe { pool.deallocate(slot); }
  }

  assert_eq!(pool.statistics(), statistics);
  assert_eq!(pool.allocate().unwrap(), freed);
}

#[test]
fn test_random_operations_keep_slots_disjoint_and_aligned() {
  const SLOT_SIZE: usize = 20;
  const ALIGNMENT: usize = 16;

  let mut rng  = StdRng::seed_from_u64(0x5107);
  let mut pool = counting_allocator(SLOT_SIZE, ALIGNMENT, 7);
  pool.set_debug_flags(AllocatorFlag::FillOnAllocate | AllocatorFlag::FillOnFree);

  // Each live slot is stamped with its own tag; an overlapping allocation would clobber a tag.
  let mut live: HashMap<usize, u8> = HashMap::new();
  let mut next_tag: u8 = 0;

  for step in 0..5_000 {
    if live.is_empty() || rng.random_bool(0.6) {
      let slot = pool.allocate().unwrap();
      assert_eq!(slot.as_ptr() as usize % ALIGNMENT, 0);
      assert!(live.insert(slot.as_ptr() as usize, next_tag).is_none(), "slot handed out twice");
      unsafe { slot.as_ptr().write_bytes(next_tag, SLOT_SIZE); }
      next_tag = next_tag.wrapping_add(1);
    } else {
      let index   = rng.random_range(0..live.len());
      let address = *live.keys().nth(index).unwrap();
      let tag     = live.remove(&address).unwrap();
      let slot    = NonNull::new(address as *mut Void).unwrap();

      let contents = unsafe { std::slice::from_raw_parts(slot.as_ptr(), SLOT_SIZE) };
      assert!(contents.iter().all(|&byte| byte == tag), "slot contents were overwritten");
      assert!(pool.is_live_allocation(slot.as_ptr()));
      unsafe { pool.deallocate(slot); }
    }

    if step % 500 == 0 {
      assert!(pool.check_invariant());
      assert_eq!(pool.statistics().live_slots, live.len());
    }
  }

  let mut addresses: Vec<usize> = live.keys().copied().collect();
  addresses.sort_unstable();
  for pair in addresses.windows(2) {
    assert!(pair[1] - pair[0] >= SLOT_SIZE);
  }
  assert!(pool.check_invariant());
}

#[test]
fn test_out_of_memory_leaves_state_unchanged() {
  let mut pool = counting_allocator(16, 8, 2);
  let a = pool.allocate().unwrap();
  let b = pool.allocate().unwrap();
  let statistics = pool.statistics();

  pool.provider().set_failing(true);
  match pool.allocate() {
    Err(AllocatorError::OutOfMemory { bytes_requested }) => {
      assert_eq!(bytes_requested, pool.chunk_byte_size());
    }
    other => panic!("expected OutOfMemory, got {:?}", other),
  }
  assert_eq!(pool.statistics(), statistics);
  assert!(pool.check_invariant());
  assert!(pool.is_live_allocation(a.as_ptr()));

  // Freed slots are still served without the system.
  unsafe { pool.deallocate(b); }
  assert_eq!(pool.allocate().unwrap(), b);

  pool.provider().set_failing(false);
  let c = pool.allocate().unwrap();
  assert!(pool.is_valid_allocation(c.as_ptr()));
  assert_eq!(pool.statistics().active_chunks, 2);
}

#[test]
fn test_allocate_before_init() {
  let mut pool = BlockAllocator::new();
  assert!(!pool.is_initialized());
  assert_eq!(pool.slot_size(), 0);
  assert_eq!(pool.chunk_byte_size(), 0);
  assert!(matches!(pool.allocate(), Err(AllocatorError::NotInitialized)));

  // Harmless on an uninitialized allocator.
  pool.deallocate_all();
  pool.reset();
  assert!(pool.check_invariant());
}

#[test]
fn test_invalid_init_keeps_previous_configuration() {
  let mut pool = counting_allocator(16, 8, 4);
  let slot = pool.allocate().unwrap();

  let result = pool.init(16, 3, 4);
  assert_eq!(
    result,
    Err(AllocatorError::InvalidConfiguration(ConfigurationError::AlignmentNotPowerOfTwo { alignment: 3 }))
  );
  assert!(matches!(
    pool.init(0, 8, 4),
    Err(AllocatorError::InvalidConfiguration(ConfigurationError::ZeroSlotSize))
  ));
  assert!(matches!(
    pool.init(16, 8, 0),
    Err(AllocatorError::InvalidConfiguration(ConfigurationError::ZeroSlotsPerChunk))
  ));

  assert_eq!(pool.slot_size(), 16);
  assert_eq!(pool.provider().releases(), 0);
  assert!(pool.is_live_allocation(slot.as_ptr()));
}

#[test]
fn test_reinit_releases_all_chunks() {
  let mut pool = counting_allocator(16, 8, 4);
  for _ in 0..5 {
    pool.allocate().unwrap();
  }
  pool.deallocate_all();
  pool.allocate().unwrap();
  assert_eq!(pool.provider().acquisitions(), 2);

  pool.init(64, 64, 2).unwrap();
  assert_eq!(pool.provider().outstanding(), 0);
  assert_eq!(pool.statistics().bytes_reserved, 0);
  assert_eq!(pool.slot_size(), 64);
  assert_eq!(pool.alignment(), 64);
  assert_eq!(pool.slots_per_chunk(), 2);

  let slot = pool.allocate().unwrap();
  assert_eq!(slot.as_ptr() as usize % 64, 0);
  assert_eq!(pool.provider().acquisitions(), 3);
}

#[test]
fn test_is_valid_allocation() {
  let mut pool = counting_allocator(16, 8, 4);
  let full: Vec<_> = (0..4).map(|_| pool.allocate().unwrap()).collect();
  let a = pool.allocate().unwrap();

  // Completely carved chunk behind the current one.
  assert!(full.iter().all(|slot| pool.is_valid_allocation(slot.as_ptr())));
  assert!(pool.is_valid_allocation(a.as_ptr()));

  // Unclaimed bump space past the cursor.
  let unclaimed = unsafe { a.as_ptr().add(16) };
  assert!(!pool.is_valid_allocation(unclaimed));
  // Inside a slot but not at its start.
  assert!(!pool.is_valid_allocation(unsafe { a.as_ptr().add(1) }));
  // Not ours at all.
  let foreign = 0u64;
  assert!(!pool.is_valid_allocation((&foreign as *const u64).cast()));
  assert!(!pool.is_valid_allocation(std::ptr::null()));

  // Freed slots are still valid but no longer live.
  unsafe { pool.deallocate(full[1]); }
  assert!(pool.is_valid_allocation(full[1].as_ptr()));
  assert!(!pool.is_live_allocation(full[1].as_ptr()));
  assert!(pool.is_live_allocation(full[0].as_ptr()));
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "was not allocated by this allocator")]
fn test_foreign_deallocation_is_caught_in_debug_builds() {
  let mut pool    = counting_allocator(16, 8, 4);
  let _slot       = pool.allocate().unwrap();
  let mut foreign = [0u64; 2];

  unsafe { pool.deallocate(NonNull::new(foreign.as_mut_ptr().cast::<Void>()).unwrap()); }
}

#[test]
#[cfg(debug_assertions)]
#[should_panic(expected = "was not allocated by this allocator")]
fn test_deallocating_slot_invalidated_by_deallocate_all_is_caught_in_debug_builds() {
  let mut pool = counting_allocator(16, 8, 4);
  let stale    = pool.allocate().unwrap();
  pool.allocate().unwrap();
  pool.deallocate_all();

  // The chunk memory is still held on the spare list, but `stale` was never handed out from it since.
  assert_eq!(pool.statistics().spare_chunks, 1);
  unsafe { pool.deallocate(stale); }
}

#[test]
#[cfg(feature = "pool_debug")]
#[should_panic(expected = "already free")]
fn test_double_free_is_caught() {
  let mut pool = counting_allocator(16, 8, 4);
  let slot     = pool.allocate().unwrap();

  unsafe {
    pool.deallocate(slot);
    pool.deallocate(slot);
  }
}

#[test]
#[cfg(feature = "pool_debug")]
fn test_slow_paths_check_invariant_across_chunk_acquisitions() {
  let slots_per_chunk = 3;
  let mut pool        = counting_allocator(24, 8, slots_per_chunk);

  // Each new chunk dumps the allocator state and asserts the invariant first.
  let slots: Vec<_> = (0..4 * slots_per_chunk).map(|_| pool.allocate().unwrap()).collect();
  assert_eq!(pool.provider().acquisitions(), 4);

  unsafe {
    for &slot in slots.iter().step_by(2) {
      pool.deallocate(slot);
    }
  }
  pool.dump_memory_variables();
  assert!(pool.check_invariant());

  // `deallocate_all` asserts the invariant on the way out; refilling then walks the spare chunks.
  pool.deallocate_all();
  for _ in 0..5 * slots_per_chunk {
    pool.allocate().unwrap();
  }
  assert_eq!(pool.provider().acquisitions(), 5);
  pool.dump_memory_variables();
  assert!(pool.check_invariant());
}

#[test]
fn test_debug_fill_patterns() {
  let config   = AllocatorConfig::new(32)
      .with_slots_per_chunk(4)
      .with_debug_flags(AllocatorFlag::FillOnAllocate | AllocatorFlag::FillOnFree);
  let mut pool = BlockAllocator::with_config(config).unwrap();
  let slot_size = pool.slot_size();

  let slot = pool.allocate().unwrap();
  let contents = unsafe { std::slice::from_raw_parts(slot.as_ptr(), slot_size) };
  assert!(contents.iter().all(|&byte| byte == ALLOCATED_FILL));

  unsafe {
    slot.as_ptr().write_bytes(0, slot_size);
    pool.deallocate(slot);
  }
  // The first word holds the free list link.
  let contents = unsafe { std::slice::from_raw_parts(slot.as_ptr(), slot_size) };
  assert!(contents[size_of::<usize>()..].iter().all(|&byte| byte == FREED_FILL));

  // Reused slots are stamped again.
  pool.set_debug_flags(AllocatorFlag::FillOnAllocate);
  let again = pool.allocate().unwrap();
  assert_eq!(again, slot);
  let contents = unsafe { std::slice::from_raw_parts(again.as_ptr(), slot_size) };
  assert!(contents.iter().all(|&byte| byte == ALLOCATED_FILL));
}

#[test]
fn test_init_keeps_debug_flags() {
  let mut pool = BlockAllocator::new();
  pool.set_debug_flags(AllocatorFlag::FillOnFree);
  pool.init(8, 8, 2).unwrap();
  assert_eq!(pool.debug_flags(), AllocatorFlags::from(AllocatorFlag::FillOnFree));

  pool.configure(AllocatorConfig::new(8)).unwrap();
  assert!(pool.debug_flags().is_empty());
}

#[test]
fn test_sub_word_slots() {
  let mut pool = counting_allocator(1, 1, 3);
  assert_eq!(pool.requested_slot_size(), 1);
  assert_eq!(pool.slot_size(), size_of::<usize>());

  let slots: Vec<_> = (0..6).map(|_| pool.allocate().unwrap()).collect();
  unsafe {
    for &slot in &slots {
      pool.deallocate(slot);
    }
  }
  for &slot in slots.iter().rev() {
    assert_eq!(pool.allocate().unwrap(), slot);
  }
  assert!(pool.check_invariant());
}

#[test]
fn test_drop_releases_every_chunk() {
  let provider = CountingProvider::default();
  {
    let mut pool = BlockAllocator::with_provider(provider.clone());
    pool.init(16, 8, 2).unwrap();
    for _ in 0..5 {
      pool.allocate().unwrap();
    }
    pool.deallocate_all();
    pool.allocate().unwrap();
    assert_eq!(provider.outstanding(), 3);
  }
  assert_eq!(provider.outstanding(), 0);
}

#[test]
fn test_statistics_display() {
  let mut pool = counting_allocator(16, 8, 4);
  pool.allocate().unwrap();

  let report = pool.statistics().to_string();
  let lines: Vec<&str> = report.lines().collect();
  assert_eq!(lines.len(), 2);
  assert!(lines[0].starts_with("Active"));
  assert!(lines[1].starts_with('1'));
}

// region Typed allocator

struct DropCounter {
  value  : u32,
  dropped: Rc<Cell<usize>>,
}

impl Drop for DropCounter {
  fn drop(&mut self) {
    self.dropped.set(self.dropped.get() + 1);
  }
}

#[test]
fn test_typed_insert_and_remove() {
  let mut pool = TypedBlockAllocator::<[u64; 3]>::new(4).unwrap();
  assert_eq!(pool.as_block_allocator().slot_size(), 24);

  let first  = pool.insert([1, 2, 3]).unwrap();
  let second = pool.insert([4, 5, 6]).unwrap();
  assert_eq!(pool.len(), 2);
  assert!(pool.contains(first));

  assert_eq!(unsafe { pool.remove(first) }, [1, 2, 3]);
  assert!(!pool.contains(first));
  assert_eq!(unsafe { *second.as_ptr() }, [4, 5, 6]);

  // The freed slot is reused for the next value.
  let third = pool.insert([7, 8, 9]).unwrap();
  assert_eq!(third, first);
  assert_eq!(pool.len(), 2);
}

#[test]
fn test_typed_destroy_runs_drop() {
  let dropped  = Rc::new(Cell::new(0));
  let mut pool = TypedBlockAllocator::<DropCounter>::new(2).unwrap();

  let values: Vec<_> = (0..5)
      .map(|value| pool.insert(DropCounter { value, dropped: dropped.clone() }).unwrap())
      .collect();
  assert_eq!(unsafe { values[3].as_ref().value }, 3);

  unsafe {
    pool.destroy(values[0]);
    let removed = pool.remove(values[1]);
    assert_eq!(removed.value, 1);
    assert_eq!(dropped.get(), 1);
  }
  assert_eq!(dropped.get(), 2);

  // Bulk deallocation does not run destructors.
  pool.deallocate_all();
  assert_eq!(dropped.get(), 2);
  assert!(pool.is_empty());
  assert_eq!(pool.statistics().spare_chunks, 3);
}

#[test]
fn test_typed_zero_sized_values_get_distinct_slots() {
  let mut pool = TypedBlockAllocator::<()>::new(8).unwrap();
  let first    = pool.insert(()).unwrap();
  let second   = pool.insert(()).unwrap();
  assert_ne!(first, second);
}

#[test]
fn test_typed_allocator_respects_alignment() {
  #[repr(align(64))]
  struct CacheLine([u8; 64]);

  let mut pool = TypedBlockAllocator::with_provider(3, CountingProvider::default()).unwrap();
  for _ in 0..10 {
    let line: NonNull<CacheLine> = pool.insert(CacheLine([0xAB; 64])).unwrap();
    assert_eq!(line.as_ptr() as usize % 64, 0);
    assert_eq!(unsafe { line.as_ref().0[63] }, 0xAB);
  }
  assert_eq!(pool.statistics().system_acquisitions, 4);
}

// endregion Typed allocator
