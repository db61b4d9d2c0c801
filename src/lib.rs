//! # Struct-log Transaction Tracer
//!
//! A library reconstructing the per-instruction trace of the default
//! `debug_traceTransaction` tracer from the flat event stream of an EVM
//! execution engine.
//!
//! ## Core Features
//!
//! - **Frame Recording**
//!   - Nested call tree built from call start and end events
//!   - Storage read on SLOAD while the engine is suspended
//!
//! - **Gas & Memory Reconstruction**
//!   - Call-family gas from the forwarding rule
//!   - Memory expansion for REVERT, hashing surcharge for CREATE2
//!   - Gas costs backfilled from the next instruction
//!
//! - **Trace Output**
//!   - Storage snapshots accumulated per address, delegated calls included
//!   - Out-of-gas error marker
//!   - Optional memory, stack and storage fields
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use structlog_trace::{
//!     types::{Bytes, CallResult, CallStatus, Message, StepSnapshot, TraceConfig, TxResult},
//!     utils::state_utils::InMemoryState,
//!     StructLogger,
//! };
//! use alloy::primitives::address;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let caller = address!("c255fc198eedac7af8af0f6e0ca781794b094a61");
//! let contract = address!("d878229c9c3575f224784de610911b5607a3ad15");
//! let mut logger = StructLogger::new(InMemoryState::new());
//!
//! let config: TraceConfig = serde_json::from_str(r#"{"disableMemory": true}"#)?;
//! let trace = logger
//!     .trace_transaction(config, |engine| async move {
//!         engine.transaction_start().await?;
//!         engine.call_start(Message::call(caller, contract)).await?;
//!         engine
//!             .step(StepSnapshot {
//!                 opcode: 0x00,
//!                 gas_left: 79000,
//!                 address: contract,
//!                 ..Default::default()
//!             })
//!             .await?;
//!         engine.call_end(CallResult::success(0, Bytes::new())).await?;
//!         engine
//!             .transaction_end(TxResult {
//!                 gas_used: 21000,
//!                 status: CallStatus::Success,
//!                 return_value: Bytes::new(),
//!             })
//!             .await?;
//!         Ok(())
//!     })
//!     .await?;
//!
//! for log in &trace.struct_logs {
//!     println!("{} {} gas={} cost={}", log.pc, log.op, log.gas, log.gas_cost);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Structure
//!
//! - `evm`: Engine event channel and trace request processing
//! - `inspectors`: The struct-log tracer
//! - `types`: Core data structures and type definitions
//! - `traits`: Trait definitions for extensibility
//! - `errors`: Error types and handling
//! - `utils`: Gas formulas and state accessors

pub mod errors;
pub mod evm;
pub mod inspectors;
pub mod traits;
pub mod types;
pub mod utils;

// Re-export only the essential types and functions
pub use errors::{ConfigError, EngineError, TraceError};
pub use evm::{event_channel, EngineEvents, EngineHandle};
pub use inspectors::StructLogger;
pub use traits::{GasSchedule, Reset, StateReader, TraceOutput};
pub use types::{TraceConfig, TraceResult};
pub use utils::gas_utils::{GasParam, GasParams};
