//! Trace request processing for StructLogger
//!
//! A trace request runs the caller's driving action (the engine executing the
//! transaction) concurrently with the tracer listening on the event channel,
//! and returns the trace once both have finished.

use std::future::Future;

use log::{debug, warn};

use super::{event_channel, EngineEvents, EngineHandle};
use crate::{
    errors::TraceError,
    inspectors::StructLogger,
    traits::{GasSchedule, Reset, StateReader, TraceOutput},
    types::{TraceConfig, TraceResult},
};

impl<S, G> StructLogger<S, G>
where
    S: StateReader,
    G: GasSchedule,
{
    /// Traces one transaction executed by `action`
    ///
    /// `action` receives the engine side of a fresh event channel and must
    /// report the transaction through it, from transaction start to
    /// transaction end.
    ///
    /// # Arguments
    /// * `config` - Fields to strip from the output records
    /// * `action` - Drives the engine; its failure fails the request
    ///
    /// # Returns
    /// * `Ok(TraceResult)` - The trace of the transaction
    /// * `Err(TraceError::InvalidInput)` - The transaction used CALLCODE
    /// * `Err(TraceError::StateAccess)` - A state read failed
    /// * `Err(TraceError::Engine)` - The driving action failed
    /// * `Err(TraceError::NoTrace)` - The engine stopped before the transaction ended
    ///
    /// # Implementation Details
    /// 1. Drops the output of any previous request
    /// 2. Runs the action and the event listener concurrently
    /// 3. On failure, discards all partial state
    /// 4. Returns the cached output
    pub async fn trace_transaction<F, Fut>(
        &mut self,
        config: TraceConfig,
        action: F,
    ) -> Result<TraceResult, TraceError>
    where
        F: FnOnce(EngineHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        self.invalidate_output();
        self.set_config(config);

        let (engine, events) = event_channel();
        let (driven, listened) = tokio::join!(action(engine), self.listen(events));

        // A tracer failure also fails the action; report the cause.
        if let Err(e) = listened {
            warn!("trace request failed while processing events: {e}");
            self.abort();
            return Err(e);
        }
        if let Err(e) = driven {
            warn!("trace request failed in the driving action: {e:#}");
            self.abort();
            return Err(TraceError::Engine(e));
        }

        let output = self.get_output();
        if output.is_err() {
            debug!("engine stopped before the transaction ended");
            self.reset();
        }
        output
    }

    /// Processes events until every engine handle is dropped
    ///
    /// Each event is acknowledged only after it has been fully processed. On
    /// failure the event is left unacknowledged and the receiver dropped, so
    /// the engine's `emit` fails.
    pub async fn listen(&mut self, mut events: EngineEvents) -> Result<(), TraceError> {
        while let Some(envelope) = events.next().await {
            let (event, ack) = envelope.into_parts();
            self.handle_event(event).await?;
            ack.acknowledge();
        }
        Ok(())
    }

    /// Discards partial state and any cached output
    fn abort(&mut self) {
        self.reset();
        self.invalidate_output();
    }
}
