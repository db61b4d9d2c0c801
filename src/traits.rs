//! Tracer and collaborator traits
//!
//! This module provides traits for:
//! - Resetting tracer state between transactions
//! - Retrieving the output of a finished trace
//! - Reading account and storage state from the execution engine
//! - Looking up gas parameters of the active fork
//!
//! # Key Traits
//! - `Reset`: Clear per-transaction state
//! - `TraceOutput`: Access the cached result of the last trace
//! - `StateReader`: Asynchronous state accessor backed by the engine
//! - `GasSchedule`: Gas parameter lookup

use std::future::Future;

use alloy::primitives::{Address, B256};

use crate::utils::gas_utils::GasParam;

/// Trait for resetting tracer state between transactions
///
/// Implementors should clear any accumulated per-transaction data:
/// - Call frame stacks
/// - Storage snapshots
pub trait Reset {
    /// Clears all accumulated state data
    fn reset(&mut self);
}

/// Trait for retrieving the output of a completed trace
pub trait TraceOutput {
    /// Output produced by the tracer
    type Output;
    /// Error returned when no output is available
    type Error;

    /// Returns the cached output of the last completed trace
    fn get_output(&self) -> Result<Self::Output, Self::Error>;
}

/// Asynchronous accessor for the state before the traced transaction
///
/// Reads happen while the engine is suspended on the instruction that needs
/// them. Storage written and accounts funded earlier in the same transaction
/// are answered by the tracer itself, so implementors only need the state the
/// transaction started from.
pub trait StateReader {
    /// Error returned by failed reads
    type Error: std::error::Error + Send + Sync + 'static;

    /// Reads the value stored under `key` for `address`
    fn storage(
        &self,
        address: Address,
        key: B256,
    ) -> impl Future<Output = Result<B256, Self::Error>> + Send;

    /// Checks if `address` is empty (no code, zero nonce, zero balance)
    fn is_empty(&self, address: Address) -> impl Future<Output = Result<bool, Self::Error>> + Send;
}

/// Gas parameter lookup of the active fork
pub trait GasSchedule {
    /// Returns the value of `param`
    fn gas_param(&self, param: GasParam) -> u64;
}
