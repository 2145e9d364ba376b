use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use localrag_core::types::{Stage, StepEvent};
use localrag_core::{Error, Result};

/// Producer half of a pipeline's event stream.
///
/// Every send doubles as a cancellation check: once the receiver is dropped
/// the run stops at the next event with [`Error::Cancelled`].
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: UnboundedSender<StepEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, UnboundedReceiver<StepEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, event: StepEvent) -> Result<()> {
        self.tx.send(event).map_err(|_| Error::Cancelled)
    }

    pub fn running(&self, stage: Stage, message: impl Into<String>) -> Result<()> {
        self.emit(StepEvent::running(stage, message))
    }

    pub fn streaming(&self, stage: Stage, content: impl Into<String>) -> Result<()> {
        self.emit(StepEvent::streaming(stage, content))
    }

    pub fn done(&self, stage: Stage, content: impl Into<String>) -> Result<()> {
        self.emit(StepEvent::done(stage, content))
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.is_closed()
    }
}
