//! Event handlers building the call frame tree
//!
//! Frames form a strict stack while recording: a call start pushes a frame,
//! a call end pops it into its parent. The outermost frame stays on the stack
//! until the transaction ends and is then handed to the flattener.

use log::{debug, trace, warn};
use revm::bytecode::opcode::SSTORE;

use super::{trace::flatten_trace, StructLogger};
use crate::{
    errors::TraceError,
    traits::{GasSchedule, Reset, StateReader},
    types::{CallFrame, CallResult, EngineEvent, Message, StepSnapshot, TraceEntry, TxResult},
};

impl<S, G> StructLogger<S, G>
where
    S: StateReader,
    G: GasSchedule,
{
    /// Processes one engine event
    ///
    /// The engine must not advance before this returns.
    ///
    /// # Errors
    /// * [`TraceError::InvalidInput`] - the step uses CALLCODE
    /// * [`TraceError::StateAccess`] - a state read failed
    ///
    /// # Panics
    /// When the engine breaks its event contract: a step with no active call,
    /// or a call starting without a preceding instruction in its parent.
    pub async fn handle_event(&mut self, event: EngineEvent) -> Result<(), TraceError> {
        match event {
            EngineEvent::TransactionStart => self.transaction_start(),
            EngineEvent::CallStart(message) => self.call_start(&message),
            EngineEvent::Step(snapshot) => self.step(snapshot).await?,
            EngineEvent::CallEnd(result) => self.call_end(result),
            EngineEvent::TransactionEnd(result) => self.transaction_end(result),
        }
        Ok(())
    }

    /// Discards all state of the previous transaction
    fn transaction_start(&mut self) {
        debug!("transaction started, resetting trace state");
        self.reset();
    }

    /// Pushes a new frame for `message`
    fn call_start(&mut self, message: &Message) {
        if let Some(parent) = self.frames.last() {
            assert!(
                parent.accepts_child(),
                "call to {:?} started at depth {} without a preceding instruction in the calling frame",
                message.to,
                self.frames.len()
            );
        }
        trace!(
            "call started: from={} to={:?} value={} gas_limit={} delegatecall={} static={} depth={}",
            message.caller,
            message.to,
            message.value,
            message.gas_limit,
            message.delegatecall,
            message.is_static,
            self.frames.len() + 1
        );
        // Delegated calls carry their caller's value without transferring it.
        if let (Some(to), false) = (message.to, message.delegatecall || message.value.is_zero()) {
            self.funded.insert(to);
        }
        self.frames.push(CallFrame::new(message));
    }

    /// Records one instruction in the active frame
    async fn step(&mut self, snapshot: StepSnapshot) -> Result<(), TraceError> {
        assert!(
            !self.frames.is_empty(),
            "step at pc {} reported while no call frame is active",
            snapshot.pc
        );
        let context = snapshot.address;
        let record = self.build_step(snapshot).await?;
        if record.opcode == SSTORE {
            self.written
                .entry(context)
                .or_default()
                .extend(record.storage.iter().map(|(key, value)| (*key, *value)));
        }
        trace!(
            "step: pc={} op={} gas={} cost={} depth={}",
            record.pc,
            record.op_name(),
            record.gas,
            record.gas_cost,
            record.depth
        );
        if let Some(frame) = self.frames.last_mut() {
            frame.entries.push(TraceEntry::Step(record));
        }
        Ok(())
    }

    /// Attaches `result` to the active frame and pops it into its parent
    fn call_end(&mut self, result: CallResult) {
        trace!(
            "call ended: status={:?} gas_used={} depth={}",
            result.status,
            result.gas_used,
            self.frames.len()
        );
        let Some(frame) = self.frames.last_mut() else {
            warn!("call end reported while no call frame is active, ignoring");
            return;
        };
        if let Some(created) = result.created_address {
            frame.address.get_or_insert(created);
            self.funded.insert(created);
        }
        frame.result = Some(result);
        if self.frames.len() > 1 {
            self.pop_frame();
        }
    }

    /// Flattens the finished tree and caches the output
    fn transaction_end(&mut self, result: TxResult) {
        if self.frames.len() > 1 {
            warn!(
                "transaction ended with {} unclosed call frames, folding them into their parents",
                self.frames.len() - 1
            );
            while self.frames.len() > 1 {
                self.pop_frame();
            }
        }
        let root = self.frames.pop().unwrap_or_default();
        let output = flatten_trace(root, result, &mut self.storage, &self.config);
        debug!(
            "transaction ended: gas={} failed={} struct_logs={}",
            output.gas,
            output.failed,
            output.struct_logs.len()
        );
        self.output = Some(output);
    }

    /// Moves the active frame into its parent's entries
    fn pop_frame(&mut self) {
        if let Some(frame) = self.frames.pop() {
            match self.frames.last_mut() {
                Some(parent) => parent.entries.push(TraceEntry::Frame(frame)),
                None => self.frames.push(frame),
            }
        }
    }
}
