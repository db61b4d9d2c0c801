//! Engine-facing event channel
//!
//! The execution engine reports its progress through [`EngineHandle`]. Every
//! event is delivered together with an acknowledgement channel and the engine
//! does not advance until the tracer has fully processed the event, including
//! any state reads the event required.
//!
//! # Example
//! ```no_run
//! use structlog_trace::{
//!     types::{EngineEvent, Message, TraceConfig, TxResult, CallStatus, Bytes, Address},
//!     utils::state_utils::InMemoryState,
//!     StructLogger,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut logger = StructLogger::new(InMemoryState::new());
//! let trace = logger
//!     .trace_transaction(TraceConfig::default(), |engine| async move {
//!         engine.emit(EngineEvent::TransactionStart).await?;
//!         engine.emit(EngineEvent::CallStart(Message::call(Address::ZERO, Address::ZERO))).await?;
//!         // ... step and call-end events reported by the engine ...
//!         engine
//!             .emit(EngineEvent::TransactionEnd(TxResult {
//!                 gas_used: 21000,
//!                 status: CallStatus::Success,
//!                 return_value: Bytes::new(),
//!             }))
//!             .await?;
//!         Ok(())
//!     })
//!     .await?;
//! println!("{} instructions", trace.struct_logs.len());
//! # Ok(())
//! # }
//! ```

pub mod processor;

use tokio::sync::{mpsc, oneshot};

use crate::{
    errors::EngineError,
    types::{CallResult, EngineEvent, Message, StepSnapshot, TxResult},
};

/// Events in flight between engine and tracer
///
/// The engine blocks on every event, so more than one is never pending.
const EVENT_BUFFER: usize = 1;

/// Event paired with the acknowledgement the engine waits for
#[derive(Debug)]
pub(crate) struct Envelope {
    event: EngineEvent,
    ack: oneshot::Sender<()>,
}

impl Envelope {
    pub(crate) fn into_parts(self) -> (EngineEvent, Acknowledgement) {
        (self.event, Acknowledgement(self.ack))
    }
}

/// Resumes the engine once the event has been processed
///
/// Dropping it without calling [`Acknowledgement::acknowledge`] makes the
/// engine's `emit` fail with [`EngineError::Detached`].
#[derive(Debug)]
pub(crate) struct Acknowledgement(oneshot::Sender<()>);

impl Acknowledgement {
    pub(crate) fn acknowledge(self) {
        // The engine may already have given up waiting.
        let _ = self.0.send(());
    }
}

/// Engine side of the event channel
#[derive(Debug, Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<Envelope>,
}

/// Tracer side of the event channel
#[derive(Debug)]
pub struct EngineEvents {
    receiver: mpsc::Receiver<Envelope>,
}

/// Creates a connected engine handle and event receiver
pub fn event_channel() -> (EngineHandle, EngineEvents) {
    let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
    (EngineHandle { sender }, EngineEvents { receiver })
}

impl EngineHandle {
    /// Delivers `event` and waits until the tracer has processed it
    ///
    /// # Errors
    /// * [`EngineError::Closed`] - the tracer stopped listening
    /// * [`EngineError::Detached`] - the tracer failed while processing the event
    pub async fn emit(&self, event: EngineEvent) -> Result<(), EngineError> {
        let (ack, acked) = oneshot::channel();
        self.sender
            .send(Envelope { event, ack })
            .await
            .map_err(|_| EngineError::Closed)?;
        acked.await.map_err(|_| EngineError::Detached)
    }

    /// Blocking variant of [`EngineHandle::emit`] for engines running on a
    /// blocking thread
    ///
    /// # Panics
    /// When called from within an asynchronous execution context. Run the
    /// engine through `tokio::task::spawn_blocking` or a dedicated thread.
    pub fn emit_blocking(&self, event: EngineEvent) -> Result<(), EngineError> {
        let (ack, acked) = oneshot::channel();
        self.sender
            .blocking_send(Envelope { event, ack })
            .map_err(|_| EngineError::Closed)?;
        acked.blocking_recv().map_err(|_| EngineError::Detached)
    }

    /// Reports the start of a transaction
    pub async fn transaction_start(&self) -> Result<(), EngineError> {
        self.emit(EngineEvent::TransactionStart).await
    }

    /// Reports the start of a call
    pub async fn call_start(&self, message: Message) -> Result<(), EngineError> {
        self.emit(EngineEvent::CallStart(message)).await
    }

    /// Reports an instruction about to execute
    pub async fn step(&self, snapshot: StepSnapshot) -> Result<(), EngineError> {
        self.emit(EngineEvent::Step(snapshot)).await
    }

    /// Reports the end of the innermost call
    pub async fn call_end(&self, result: CallResult) -> Result<(), EngineError> {
        self.emit(EngineEvent::CallEnd(result)).await
    }

    /// Reports the end of the transaction
    pub async fn transaction_end(&self, result: TxResult) -> Result<(), EngineError> {
        self.emit(EngineEvent::TransactionEnd(result)).await
    }
}

impl EngineEvents {
    /// Receives the next event, `None` once every engine handle is dropped
    pub(crate) async fn next(&mut self) -> Option<Envelope> {
        self.receiver.recv().await
    }
}
