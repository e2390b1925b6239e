use std::fmt::Debug;
use tracing::{
  field::{Field, Visit},
  Event,
  Subscriber
};
use tracing_subscriber::{
  Layer,
  layer::Context,
  registry::LookupSpan
};

use super::get_global_logging_threshold;

/// A `tracing` layer that drops every event whose `threshold` field exceeds the global logging threshold. Events
/// without a `threshold` field are treated as threshold 0 and always pass.
pub(crate) struct ThresholdFilterLayer;

impl<S> Layer<S> for ThresholdFilterLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
  fn event_enabled(&self, event: &Event<'_>, _ctx: Context<'_, S>) -> bool {
    let mut visitor = ThresholdVisitor { threshold: None };
    event.record(&mut visitor);

    match visitor.threshold {
      Some(threshold) => threshold <= get_global_logging_threshold(),
      None            => true,
    }
  }
}

/// Pulls the `threshold` field out of an event.
struct ThresholdVisitor {
  threshold: Option<u8>,
}

impl ThresholdVisitor {
  fn record_threshold(&mut self, value: i128) {
    match u8::try_from(value) {
      Ok(threshold) => self.threshold = Some(threshold),
      Err(_) => panic!("Invalid threshold value supplied to the logger: {}. Thresholds must fit in a u8.", value),
    }
  }
}

impl Visit for ThresholdVisitor {
  fn record_i64(&mut self, field: &Field, value: i64) {
    if field.name() == "threshold" {
      self.record_threshold(value as i128);
    }
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    if field.name() == "threshold" {
      self.record_threshold(value as i128);
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
    if field.name() == "threshold" {
      panic!("Invalid threshold value supplied to the logger: {:?}. Thresholds must be integers.", value);
    }
  }
}
