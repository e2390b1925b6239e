/*!

Errors reported by the allocator. Passing `deallocate` a pointer that is not a live allocation is a contract
violation, not an error, and so does not appear here.

*/

use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

/// A rejected allocator configuration. The allocator is left untouched when `init` fails with one of these.
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
  ZeroSlotSize,
  AlignmentNotPowerOfTwo {
    alignment: usize
  },
  ZeroSlotsPerChunk,
  /// The chunk byte size overflows `usize` or exceeds what a `Layout` can describe.
  ChunkTooLarge {
    slot_size      : usize,
    slots_per_chunk: usize
  },
}

impl Display for ConfigurationError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      ConfigurationError::ZeroSlotSize => {
        write!(f, "the slot size must be greater than zero")
      }

      ConfigurationError::AlignmentNotPowerOfTwo { alignment } => {
        write!(f, "the alignment {} is not a power of two", alignment)
      }

      ConfigurationError::ZeroSlotsPerChunk => {
        write!(f, "a chunk must hold at least one slot")
      }

      ConfigurationError::ChunkTooLarge { slot_size, slots_per_chunk } => {
        write!(
          f,
          "a chunk of {} slots of {} bytes each is too large to allocate",
          slots_per_chunk,
          slot_size
        )
      }

    } // end match on `ConfigurationError`
  }
}

impl Debug for ConfigurationError {
  fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

impl Error for ConfigurationError {}


#[derive(Copy, Clone, PartialEq, Eq)]
pub enum AllocatorError {
  /// The system allocator could not satisfy a request for a new chunk.
  OutOfMemory {
    bytes_requested: usize
  },
  /// `allocate` was called before `init`.
  NotInitialized,
  InvalidConfiguration(ConfigurationError),
}

impl Display for AllocatorError {
  fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
    match self {

      AllocatorError::OutOfMemory { bytes_requested } => {
        write!(f, "out of memory: the system allocator could not provide a chunk of {} bytes", bytes_requested)
      }

      AllocatorError::NotInitialized => {
        write!(f, "the allocator must be initialized before it can allocate")
      }

      AllocatorError::InvalidConfiguration(error) => {
        write!(f, "invalid allocator configuration: {}", error)
      }

    } // end match on `AllocatorError`
  }
}

impl Debug for AllocatorError {
  fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
    Display::fmt(self, f)
  }
}

impl Error for AllocatorError {
  fn source(&self) -> Option<&(dyn Error + 'static)> {
    match self {
      AllocatorError::InvalidConfiguration(error) => Some(error),
      _ => None,
    }
  }
}

impl From<ConfigurationError> for AllocatorError {
  fn from(error: ConfigurationError) -> Self {
    AllocatorError::InvalidConfiguration(error)
  }
}
