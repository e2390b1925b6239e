/*!

# Overview

Logging for the allocator. Every message carries two pieces of information: its _level_ (critical, error, warning,
info, debug, trace), which says what kind of message it is, and a numeric _threshold_, which says how verbose the
logger has to be before the message is emitted.

```
use block_pool::log::*;

// Only messages logged at threshold 2 or lower are emitted.
set_global_logging_threshold(2);

error!(0, "Chunk request of {} bytes failed.", 4096); // Emitted
info!(1, "Released {} chunks.", 3);                   // Emitted
debug!(4, "Acquired chunk at {:p}.", &0u8);           // Not emitted
```

## Threshold

The global logging threshold is shared by all levels. A message is emitted only if the threshold it is logged at is
less than or equal to the global threshold, so a message logged at threshold 0 is always emitted. The allocator logs
its routine chunk traffic at high thresholds so that it is silent unless asked.

```
use block_pool::log::{set_global_logging_threshold, get_global_logging_threshold};

set_global_logging_threshold(5);
assert_eq!(get_global_logging_threshold(), 5);
```

# Macros

`critical!`, `error!`, `warning!`, `info!`, `debug!`, `trace!`, each in two forms:

```ignore
level!(threshold, "format string", args...);
level!("format string");   // threshold 0
```

The short form is for messages without arguments. When a message has format arguments, give the threshold
explicitly; otherwise the format string would be read as the threshold.

The macros install the subscriber on first use, so no initialization call is needed. If the host application has
already installed a global `tracing` subscriber, that subscriber receives the events instead.

*/
mod formatter;
mod threshold_filter;
mod macros;

use std::sync::atomic::{AtomicU8, Ordering};

use once_cell::sync::Lazy;
use tracing_subscriber::{
  fmt,
  layer::SubscriberExt,
  Registry
};

use threshold_filter::ThresholdFilterLayer;
use formatter::CustomFieldFormatter;
pub use macros::*;

// The macros expand to `tracing` events; this keeps them usable from crates that do not depend on `tracing`.
#[doc(hidden)]
pub use tracing as __tracing;

/// Default verbosity. Routine allocator traffic is logged above this.
pub const DEFAULT_LOGGING_THRESHOLD: u8 = 3;

static GLOBAL_LOGGING_THRESHOLD: AtomicU8 = AtomicU8::new(DEFAULT_LOGGING_THRESHOLD);

/// Used for implicit initialization.
static INIT_LOGGER: Lazy<()> = Lazy::new(|| {
  let subscriber = Registry::default()
      .with(ThresholdFilterLayer)
      .with(
        fmt::layer()
            .fmt_fields(CustomFieldFormatter)
            .with_target(false)
            .without_time()
            .with_writer(std::io::stderr),
      );

  // A host application may already own the global subscriber. Its choice wins.
  let _ = tracing::subscriber::set_global_default(subscriber);
});

/// Installs the subscriber if it has not been installed yet. The logging macros call this for you.
pub fn init_logger() {
  Lazy::force(&INIT_LOGGER);
}

/// Sets the global verbosity. Takes effect immediately, before or after the logger is initialized.
pub fn set_global_logging_threshold(new_threshold: u8) {
  GLOBAL_LOGGING_THRESHOLD.store(new_threshold, Ordering::SeqCst);
}

pub fn get_global_logging_threshold() -> u8 {
  GLOBAL_LOGGING_THRESHOLD.load(Ordering::SeqCst)
}
