//! Trait implementations for StructLogger
//!
//! # Traits
//!
//! - `Reset`: Clears per-transaction state when a transaction starts
//!   - Call frame stack
//!   - Storage snapshots
//!   - Written storage and funded accounts
//!
//! - `TraceOutput`: Returns the cached output of the last completed trace

use super::StructLogger;
use crate::{
    errors::TraceError,
    traits::{Reset, TraceOutput},
    types::TraceResult,
};

impl<S, G> Reset for StructLogger<S, G> {
    /// Clears the frame stack, storage snapshots and transaction effects
    ///
    /// The cached output survives until the next trace request replaces it.
    fn reset(&mut self) {
        self.frames = Vec::new();
        self.storage.clear();
        self.written.clear();
        self.funded.clear();
    }
}

impl<S, G> TraceOutput for StructLogger<S, G> {
    type Output = TraceResult;
    type Error = TraceError;

    /// Returns a copy of the last completed trace
    ///
    /// Fails with [`TraceError::NoTrace`] before the first completed
    /// transaction and after a failed trace request.
    fn get_output(&self) -> Result<Self::Output, Self::Error> {
        self.output.clone().ok_or(TraceError::NoTrace)
    }
}
