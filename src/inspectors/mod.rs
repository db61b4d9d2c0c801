//! Execution tracers
//!
//! - `struct_logger`: Struct-log tracer producing the per-instruction trace
//!   of the default `debug_traceTransaction` tracer, with gas costs and memory
//!   reconstructed from the engine's event stream
//!
//! The tracer implements the core traits of [`crate::traits`] and is driven
//! through the event channel of [`crate::evm`].

pub mod struct_logger;

pub use struct_logger::*;
