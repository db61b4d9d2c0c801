//! Scripted engine shared by the integration tests
//!
//! Builds the event stream an EVM engine would report for a hand-written
//! program and replays it through an [`EngineHandle`].

#![allow(dead_code)]

use std::future::{ready, Future};

use alloy::primitives::{address, Address, Bytes, B256, U256};
use structlog_trace::{
    types::{CallResult, CallStatus, EngineEvent, Message, StepSnapshot, TraceConfig, TxResult},
    EngineHandle, GasSchedule, StateReader, StructLogger, TraceError, TraceResult,
};

pub const SENDER: Address = address!("c255fc198eedac7af8af0f6e0ca781794b094a61");
pub const CONTRACT: Address = address!("d878229c9c3575f224784de610911b5607a3ad15");
pub const LIBRARY: Address = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
pub const DEPLOYED: Address = address!("5fbdb2315678afecb367f032d93f642f64180aa3");

/// Installs the test logger once per test binary
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 32-byte word holding `value`
pub fn word(value: u64) -> B256 {
    B256::from(U256::from(value))
}

/// Stack from arguments listed top first
pub fn stack_top_first(args: &[U256]) -> Vec<U256> {
    args.iter().rev().copied().collect()
}

/// Address as a stack item
pub fn address_arg(address: Address) -> U256 {
    U256::from_be_slice(address.as_slice())
}

/// Event stream of one transaction, built instruction by instruction
pub struct Script {
    events: Vec<EngineEvent>,
    /// Storage context of every active call, outermost first
    contexts: Vec<Address>,
}

impl Script {
    /// Starts a transaction calling `to`
    pub fn call(to: Address) -> Self {
        Self {
            events: vec![
                EngineEvent::TransactionStart,
                EngineEvent::CallStart(Message::call(SENDER, to)),
            ],
            contexts: vec![to],
        }
    }

    fn snapshot(&self, pc: u64, opcode: u8, fee: u64, gas_left: u64) -> StepSnapshot {
        StepSnapshot {
            pc,
            opcode,
            fee,
            gas_left,
            address: self.contexts.last().copied().unwrap_or_default(),
            depth: self.contexts.len().saturating_sub(1) as u64,
            ..Default::default()
        }
    }

    /// Instruction with an empty stack and memory
    pub fn step(self, pc: u64, opcode: u8, fee: u64, gas_left: u64) -> Self {
        self.step_with(pc, opcode, fee, gas_left, Vec::new(), Vec::new())
    }

    /// Instruction with the given stack (top last) and raw memory
    pub fn step_with(
        mut self,
        pc: u64,
        opcode: u8,
        fee: u64,
        gas_left: u64,
        stack: Vec<U256>,
        memory: Vec<u8>,
    ) -> Self {
        let mut snapshot = self.snapshot(pc, opcode, fee, gas_left);
        snapshot.memory_word_count = memory.len().div_ceil(32) as u64;
        snapshot.memory = Bytes::from(memory);
        snapshot.stack = stack;
        self.events.push(EngineEvent::Step(snapshot));
        self
    }

    /// Enters a sub-call described by `message`
    pub fn enter(mut self, message: Message) -> Self {
        let context = match (message.delegatecall, message.to) {
            (true, _) => self.contexts.last().copied().unwrap_or_default(),
            (false, Some(to)) => to,
            (false, None) => DEPLOYED,
        };
        self.contexts.push(context);
        self.events.push(EngineEvent::CallStart(message));
        self
    }

    /// Leaves the innermost sub-call
    pub fn leave(mut self, result: CallResult) -> Self {
        self.contexts.pop();
        self.events.push(EngineEvent::CallEnd(result));
        self
    }

    /// Ends the outermost call and the transaction with `status`
    pub fn finish(mut self, gas_used: u64, status: CallStatus, return_value: Bytes) -> Vec<EngineEvent> {
        let call_result = CallResult {
            gas_used,
            status: status.clone(),
            return_value: return_value.clone(),
            created_address: None,
        };
        self.events.push(EngineEvent::CallEnd(call_result));
        self.events.push(EngineEvent::TransactionEnd(TxResult {
            gas_used,
            status,
            return_value,
        }));
        self.events
    }

    /// Ends the transaction successfully with no return data
    pub fn succeed(self, gas_used: u64) -> Vec<EngineEvent> {
        self.finish(gas_used, CallStatus::Success, Bytes::new())
    }
}

/// Replays `events` as the engine would, waiting for each acknowledgement
pub async fn play(engine: EngineHandle, events: Vec<EngineEvent>) -> anyhow::Result<()> {
    for event in events {
        engine.emit(event).await?;
    }
    Ok(())
}

/// Traces `events` with `logger`
pub async fn trace<S, G>(
    logger: &mut StructLogger<S, G>,
    config: TraceConfig,
    events: Vec<EngineEvent>,
) -> Result<TraceResult, TraceError>
where
    S: StateReader,
    G: GasSchedule,
{
    logger
        .trace_transaction(config, |engine| play(engine, events))
        .await
}

/// State accessor whose backend is unreachable; every read fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableState;

impl StateReader for UnreachableState {
    type Error = std::io::Error;

    fn storage(
        &self,
        _address: Address,
        _key: B256,
    ) -> impl Future<Output = Result<B256, Self::Error>> + Send {
        ready(Err(std::io::Error::other("state backend unreachable")))
    }

    fn is_empty(&self, _address: Address) -> impl Future<Output = Result<bool, Self::Error>> + Send {
        ready(Err(std::io::Error::other("state backend unreachable")))
    }
}
