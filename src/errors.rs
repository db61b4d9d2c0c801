//! Error types for struct-log tracing
//!
//! This module defines the error handling for a trace request:
//! - Trace request failures surfaced to the caller
//! - Engine-side failures of the event handshake
//! - Configuration errors of the gas schedule
//!
//! Internal invariant violations (for example a step event arriving while no
//! call frame is active) are not represented here. They indicate an engine
//! that broke its event contract and abort with a panic.

use thiserror::Error;

/// Top-level error type of a trace request
///
/// Every variant rejects the whole request; a partial trace is never returned.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The traced transaction used a construct no reconstruction rule exists for
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Reading account or storage state through the state accessor failed
    #[error("State access failed: {0}")]
    StateAccess(String),

    /// The driving action failed or the engine aborted
    #[error("Engine error: {0}")]
    Engine(anyhow::Error),

    /// A trace result was requested while no completed trace is cached
    #[error("No trace available: no transaction has completed since the last trace request")]
    NoTrace,
}

/// Errors returned to the engine side of the event channel
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// The tracer stopped listening before the event could be delivered
    #[error("Tracer is no longer listening for events")]
    Closed,

    /// The event was delivered but the tracer dropped it without acknowledging
    ///
    /// Happens when processing the event failed; the engine should stop.
    #[error("Tracer detached before acknowledging the event")]
    Detached,
}

/// Configuration errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Gas parameter name not known to the gas schedule
    #[error("Unknown gas parameter: {0}")]
    UnknownGasParam(String),
}
