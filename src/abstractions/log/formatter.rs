use std::fmt::Debug;

use tracing::field::{Field, Visit};
use tracing_subscriber::{
  field::RecordFields,
  fmt::{
    format::Writer,
    FormatFields
  }
};

/// Formats event fields, leaving out the `threshold` bookkeeping field and rendering `critical` as a prefix.
pub(crate) struct CustomFieldFormatter;

impl<'writer> FormatFields<'writer> for CustomFieldFormatter {
  fn format_fields<R: RecordFields>(
    &self,
    writer: Writer<'writer>,
    fields: R,
  ) -> std::fmt::Result {
    let mut visitor = FieldFilterVisitor { writer };
    fields.record(&mut visitor);
    Ok(())
  }
}

struct FieldFilterVisitor<'writer> {
  writer: Writer<'writer>,
}

impl<'writer> Visit for FieldFilterVisitor<'writer> {
  fn record_i64(&mut self, field: &Field, value: i64) {
    if field.name() != "threshold" {
      let _ = write!(self.writer, "{}={} ", field.name(), value);
    }
  }

  fn record_u64(&mut self, field: &Field, value: u64) {
    if field.name() != "threshold" {
      let _ = write!(self.writer, "{}={} ", field.name(), value);
    }
  }

  fn record_bool(&mut self, field: &Field, value: bool) {
    match field.name() {
      "critical" if value => { let _ = write!(self.writer, "[CRITICAL] "); }
      "critical"          => {}
      name                => { let _ = write!(self.writer, "{}={} ", name, value); }
    }
  }

  fn record_debug(&mut self, field: &Field, value: &dyn Debug) {
    match field.name() {
      "message"   => { let _ = write!(self.writer, "{:?}", value); }
      "threshold" => {}
      name        => { let _ = write!(self.writer, "{}={:?} ", name, value); }
    }
  }
}
