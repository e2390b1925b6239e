/*!

Infrastructure shared by the allocator that is not specific to it. At the moment that is just logging, which is
implemented on top of the `tracing` ecosystem. Clients that want the allocator's diagnostics can adjust the verbosity
with `log::set_global_logging_threshold`.

*/

pub mod log;
