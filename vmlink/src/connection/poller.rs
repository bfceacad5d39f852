//! Asynchronous VM status polling.
//!
//! At most one probe is in flight at a time; every completion is delivered
//! as a single event carrying both probed values. Callers that need
//! synchronous semantics (refresh, lock-down) attach an ack that resolves
//! once the next probe result has been applied and the machines have
//! settled.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::oneshot;

use crate::backend::VmBackend;

use super::events::Event;

#[derive(Debug)]
pub(crate) struct VmPoller {
    tx: UnboundedSender<Event>,
    in_flight: bool,
    acks: Vec<oneshot::Sender<()>>,
}

impl VmPoller {
    pub fn new(tx: UnboundedSender<Event>) -> Self {
        Self {
            tx,
            in_flight: false,
            acks: Vec::new(),
        }
    }

    /// Request a probe of `name`.
    ///
    /// If a probe is already in flight the request merges into it - the ack
    /// (if any) resolves when that probe completes.
    pub fn request(
        &mut self,
        backend: &Arc<dyn VmBackend>,
        name: &str,
        ack: Option<oneshot::Sender<()>>,
    ) {
        if let Some(ack) = ack {
            self.acks.push(ack);
        }

        if self.in_flight {
            tracing::trace!(vm = %name, "probe already in flight");
            return;
        }
        self.in_flight = true;

        let backend = Arc::clone(backend);
        let name = name.to_string();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match backend.probe(&name).await {
                Ok(probe) => Event::VmProbed(probe),
                Err(error) => Event::VmProbeFailed {
                    message: error.to_string(),
                },
            };
            let _ = tx.send(event);
        });
    }

    /// Note a completed probe. Returns the acks waiting on it; the caller
    /// resolves them after the state machines have settled.
    pub fn finish(&mut self) -> Vec<oneshot::Sender<()>> {
        self.in_flight = false;
        std::mem::take(&mut self.acks)
    }

    pub fn is_polling(&self) -> bool {
        self.in_flight
    }
}
