//! Struct-log tracer
//!
//! This module provides the main StructLogger type and its core functionality.
//! The logger turns the engine's flat event stream into the per-instruction
//! trace returned by the default `debug_traceTransaction` tracer.
//!
//! # Architecture
//!
//! The implementation is split across several modules:
//! - `inspector`: Event handlers building the call frame tree
//! - `step`: Instruction records, including reconstructed gas costs
//! - `trace`: Flattening of the finished tree into the output
//! - `traits`: `Reset` and `TraceOutput` implementations
//!
//! Trace requests themselves are driven from [`crate::evm::processor`].

use std::collections::{BTreeMap, HashMap, HashSet};

use alloy::primitives::{Address, B256};

use crate::{
    types::{CallFrame, TraceConfig, TraceResult},
    utils::gas_utils::GasParams,
};

mod inspector;
mod step;
mod trace;
mod traits;

/// Storage known per address, accumulated over one transaction
pub type StorageSnapshots = HashMap<Address, BTreeMap<B256, B256>>;

/// Struct-log tracer for a single trace session
///
/// Owns all per-transaction state:
/// - Call frame stack: the frame tree under construction
/// - Storage snapshots: storage known per address over the whole transaction
/// - Written storage and funded accounts: effects of the transaction so far,
///   consulted before the state accessor
/// - Cached output: result of the last completed trace
///
/// State is reset only when a transaction starts. One logger serves one trace
/// request at a time; requests take `&mut self`.
///
/// # Type Parameters
/// * `S` - State accessor used for SLOAD values and account emptiness
/// * `G` - Gas schedule, mainnet values by default
#[derive(Debug, Clone)]
pub struct StructLogger<S, G = GasParams> {
    /// State the engine executes against
    state: S,
    /// Gas parameters of the active fork
    gas: G,
    /// Options of the current trace request
    config: TraceConfig,
    /// Active call frames, outermost first
    frames: Vec<CallFrame>,
    /// Storage known per address
    storage: StorageSnapshots,
    /// Storage written so far in the transaction, per storage context
    written: StorageSnapshots,
    /// Accounts that received value or were deployed in the transaction
    funded: HashSet<Address>,
    /// Output of the last completed trace
    output: Option<TraceResult>,
}

impl<S> StructLogger<S, GasParams> {
    /// Creates a logger using mainnet gas parameters
    pub fn new(state: S) -> Self {
        Self::with_gas_schedule(state, GasParams::default())
    }
}

impl<S, G> StructLogger<S, G> {
    /// Creates a logger using a custom gas schedule
    pub fn with_gas_schedule(state: S, gas: G) -> Self {
        Self {
            state,
            gas,
            config: TraceConfig::default(),
            frames: Vec::new(),
            storage: HashMap::new(),
            written: HashMap::new(),
            funded: HashSet::new(),
            output: None,
        }
    }

    /// Returns the state accessor
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Returns the options of the current trace request
    pub fn config(&self) -> TraceConfig {
        self.config
    }

    /// Replaces the options applied when the next trace is flattened
    pub fn set_config(&mut self, config: TraceConfig) {
        self.config = config;
    }

    /// Number of call frames currently active
    pub fn active_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the cached output of the last completed trace, if any
    pub fn output(&self) -> Option<&TraceResult> {
        self.output.as_ref()
    }

    /// Drops the cached output
    pub(crate) fn invalidate_output(&mut self) {
        self.output = None;
    }
}
