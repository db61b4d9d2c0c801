//! Core types for struct-log tracing
//!
//! This module defines the data structures shared across the tracer:
//! - Engine event payloads (messages, step snapshots, call results)
//! - The call frame tree built while recording
//! - Instruction records, both in-flight and in their final output shape
//! - Trace request configuration

use std::collections::BTreeMap;

pub use alloy::primitives::{Address, Bytes, B256, U256};
use revm::bytecode::opcode::OpCode;
use serde::{Deserialize, Serialize};

/// Size of one EVM word in bytes
pub const WORD_SIZE: usize = 32;

// ========================= Engine events =========================

/// Notification emitted by the execution engine
///
/// Events arrive strictly in program order. The engine does not advance until
/// the tracer acknowledges each one (see [`crate::evm::EngineHandle`]).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A transaction is about to execute
    TransactionStart,
    /// A message call or contract creation is about to execute
    CallStart(Message),
    /// An instruction is about to execute
    Step(StepSnapshot),
    /// The innermost active call returned
    CallEnd(CallResult),
    /// The transaction finished executing
    TransactionEnd(TxResult),
}

/// Message describing a call or contract creation
#[derive(Debug, Clone, Default)]
pub struct Message {
    /// Address the message is sent from
    pub caller: Address,
    /// Target address, `None` for contract creation
    pub to: Option<Address>,
    /// Native value transferred with the message
    pub value: U256,
    /// Gas made available to the message
    pub gas_limit: u64,
    /// Whether the callee's code runs in the caller's storage context
    pub delegatecall: bool,
    /// Whether state modifications are forbidden
    pub is_static: bool,
}

impl Message {
    /// Regular call to `to`
    pub fn call(caller: Address, to: Address) -> Self {
        Self {
            caller,
            to: Some(to),
            ..Default::default()
        }
    }

    /// Delegated call executing `code_address` in the caller's context
    pub fn delegate_call(caller: Address, code_address: Address) -> Self {
        Self {
            caller,
            to: Some(code_address),
            delegatecall: true,
            ..Default::default()
        }
    }

    /// Contract creation
    pub fn create(caller: Address) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }
}

/// Interpreter state reported right before an instruction executes
#[derive(Debug, Clone, Default)]
pub struct StepSnapshot {
    /// Program counter
    pub pc: u64,
    /// Opcode byte
    pub opcode: u8,
    /// Static fee of the opcode as known to the engine
    pub fee: u64,
    /// Gas remaining before execution
    pub gas_left: u64,
    /// Memory size in words as tracked by the engine
    pub memory_word_count: u64,
    /// Stack, most recently pushed item last
    pub stack: Vec<U256>,
    /// Raw memory contents
    pub memory: Bytes,
    /// Address whose storage the executing code operates on
    pub address: Address,
    /// Engine call depth, 0 for the outermost call
    pub depth: u64,
}

/// Status of a finished call or transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CallStatus {
    /// Completed successfully
    Success,
    /// Explicitly reverted
    Revert,
    /// Ran out of gas
    OutOfGas,
    /// Halted for any other reason
    Halt(String),
}

impl CallStatus {
    /// Check if the call was successful
    pub fn is_success(&self) -> bool {
        matches!(self, CallStatus::Success)
    }

    /// Check if the call failed for running out of gas
    pub fn is_out_of_gas(&self) -> bool {
        matches!(self, CallStatus::OutOfGas)
    }
}

/// Result reported when a call returns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallResult {
    /// Gas consumed by the call
    pub gas_used: u64,
    /// How the call finished
    pub status: CallStatus,
    /// Return or revert data
    pub return_value: Bytes,
    /// Address of the deployed contract for successful creations
    pub created_address: Option<Address>,
}

impl CallResult {
    /// Successful call returning `return_value`
    pub fn success(gas_used: u64, return_value: Bytes) -> Self {
        Self {
            gas_used,
            status: CallStatus::Success,
            return_value,
            created_address: None,
        }
    }

    /// Failed call
    pub fn failure(gas_used: u64, status: CallStatus) -> Self {
        Self {
            gas_used,
            status,
            return_value: Bytes::new(),
            created_address: None,
        }
    }
}

/// Final result of the traced transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxResult {
    /// Total gas used by the transaction
    pub gas_used: u64,
    /// How the transaction finished
    pub status: CallStatus,
    /// Return or revert data of the outermost call
    pub return_value: Bytes,
}

// ========================= Recording =========================

/// Instruction record as built while recording
///
/// Carries the engine word count and a reconstruction flag that only the
/// flattener reads; neither reaches the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    /// Program counter
    pub pc: u64,
    /// Opcode byte
    pub opcode: u8,
    /// Gas remaining before execution
    pub gas: u64,
    /// Gas consumed by this instruction
    pub gas_cost: u64,
    /// Call depth, 1 for the outermost call
    pub depth: u64,
    /// Stack snapshot, most recently pushed item last
    pub stack: Vec<U256>,
    /// Memory snapshot in 32-byte words
    pub memory: Vec<B256>,
    /// Storage touched by this instruction
    pub storage: BTreeMap<B256, B256>,
    /// Memory size in words as reported by the engine
    pub memory_word_count: u64,
    /// Gas cost was computed from the opcode's arguments and must be kept
    pub gas_cost_reconstructed: bool,
}

impl StepRecord {
    /// Mnemonic of the opcode, e.g. `SLOAD`
    pub fn op_name(&self) -> String {
        opcode_name(self.opcode)
    }

    /// Pad memory with zero words up to `words`
    pub fn pad_memory(&mut self, words: usize) {
        if self.memory.len() < words {
            self.memory.resize(words, B256::ZERO);
        }
    }
}

/// Entry of a call frame: an instruction or a nested call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEntry {
    /// Instruction executed in this frame
    Step(StepRecord),
    /// Sub-call triggered by the preceding instruction
    Frame(CallFrame),
}

impl TraceEntry {
    /// Returns the instruction record if this entry is one
    pub fn as_step(&self) -> Option<&StepRecord> {
        match self {
            TraceEntry::Step(step) => Some(step),
            TraceEntry::Frame(_) => None,
        }
    }

    /// Mutable counterpart of [`TraceEntry::as_step`]
    pub fn as_step_mut(&mut self) -> Option<&mut StepRecord> {
        match self {
            TraceEntry::Step(step) => Some(step),
            TraceEntry::Frame(_) => None,
        }
    }

    /// Check if this entry is a nested frame
    pub fn is_frame(&self) -> bool {
        matches!(self, TraceEntry::Frame(_))
    }
}

/// One call context of the transaction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallFrame {
    /// Target address, `None` for a creation until the engine reports it
    pub address: Option<Address>,
    /// Whether the frame runs in its caller's storage context
    pub delegatecall: bool,
    /// Instructions and nested frames in execution order
    pub entries: Vec<TraceEntry>,
    /// Result attached once the call returns
    pub result: Option<CallResult>,
}

impl CallFrame {
    /// Creates an empty frame for `message`
    pub fn new(message: &Message) -> Self {
        Self {
            address: message.to,
            delegatecall: message.delegatecall,
            entries: Vec::new(),
            result: None,
        }
    }

    /// Number of instruction records in this frame and all nested frames
    pub fn step_count(&self) -> usize {
        self.entries
            .iter()
            .map(|entry| match entry {
                TraceEntry::Step(_) => 1,
                TraceEntry::Frame(frame) => frame.step_count(),
            })
            .sum()
    }

    /// Check if a nested frame may be appended right now
    ///
    /// A sub-call is always observed through the instruction that issued it,
    /// so the last entry must be an instruction record.
    pub fn accepts_child(&self) -> bool {
        matches!(self.entries.last(), Some(TraceEntry::Step(_)))
    }
}

// ========================= Output =========================

/// Error marker attached to the final record of an out-of-gas trace
///
/// Serializes as an empty object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ErrorMarker {}

/// Instruction record in its final output shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StructLog {
    /// Program counter
    pub pc: u64,
    /// Opcode mnemonic
    pub op: String,
    /// Gas remaining before execution
    pub gas: u64,
    /// Gas consumed by this instruction
    pub gas_cost: u64,
    /// Call depth, 1 for the outermost call
    pub depth: u64,
    /// Stack snapshot, absent when disabled
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "hex_words::stack"
    )]
    pub stack: Option<Vec<U256>>,
    /// Memory snapshot, absent when disabled
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "hex_words::memory"
    )]
    pub memory: Option<Vec<B256>>,
    /// Storage of the executing address as known after this instruction
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "hex_words::storage"
    )]
    pub storage: Option<BTreeMap<B256, B256>>,
    /// Present on the final record when the transaction ran out of gas
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMarker>,
}

impl StructLog {
    /// Converts a recorded step, keeping only the fields `config` allows
    pub fn from_record(record: StepRecord, config: &TraceConfig) -> Self {
        let op = record.op_name();
        Self {
            pc: record.pc,
            op,
            gas: record.gas,
            gas_cost: record.gas_cost,
            depth: record.depth,
            stack: (!config.disable_stack).then_some(record.stack),
            memory: (!config.disable_memory).then_some(record.memory),
            storage: (!config.disable_storage).then_some(record.storage),
            error: None,
        }
    }
}

/// Complete struct-log trace of one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceResult {
    /// Total gas used by the transaction
    pub gas: u64,
    /// Whether the transaction failed
    pub failed: bool,
    /// Return data of the transaction
    #[serde(serialize_with = "hex_words::bytes")]
    pub return_value: Bytes,
    /// Executed instructions in order
    pub struct_logs: Vec<StructLog>,
}

/// Options of a trace request
///
/// Deserializes from the option object of the tracing API, e.g.
/// `{"disableMemory": true}`. Missing options default to `false`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TraceConfig {
    /// Omit the memory field from every record
    pub disable_memory: bool,
    /// Omit the stack field from every record
    pub disable_stack: bool,
    /// Omit the storage field from every record
    pub disable_storage: bool,
}

/// Mnemonic of an opcode byte
///
/// Unassigned opcodes render as their hex value.
pub fn opcode_name(opcode: u8) -> String {
    match OpCode::new(opcode) {
        Some(op) => op.as_str().to_string(),
        None => format!("0x{opcode:02x}"),
    }
}

/// Splits raw memory into 32-byte words, zero-padding a trailing partial word
pub fn memory_words(memory: &[u8]) -> Vec<B256> {
    memory
        .chunks(WORD_SIZE)
        .map(B256::right_padding_from)
        .collect()
}

/// Serializers rendering words as unprefixed, fixed-width lowercase hex
mod hex_words {
    use std::collections::BTreeMap;

    use alloy::primitives::{hex, Bytes, B256, U256};
    use serde::Serializer;

    pub(super) fn stack<S: Serializer>(
        stack: &Option<Vec<U256>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match stack {
            Some(words) => {
                serializer.collect_seq(words.iter().map(|word| hex::encode(B256::from(*word))))
            }
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn memory<S: Serializer>(
        memory: &Option<Vec<B256>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match memory {
            Some(words) => serializer.collect_seq(words.iter().map(hex::encode)),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn storage<S: Serializer>(
        storage: &Option<BTreeMap<B256, B256>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match storage {
            Some(slots) => serializer.collect_map(
                slots
                    .iter()
                    .map(|(key, value)| (hex::encode(key), hex::encode(value))),
            ),
            None => serializer.serialize_none(),
        }
    }

    pub(super) fn bytes<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }
}
