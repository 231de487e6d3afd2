//! Cook notifications for hosts (node editors, status bars, renderers).
//!
//! Every subscriber gets its own unbounded channel; `emit` fans out to all
//! of them and forgets subscribers whose receiver was dropped.

use std::sync::{Arc, RwLock};

use crossbeam_channel::{Receiver, Sender, unbounded};

use super::job::JobOutcome;
use crate::graph::{CookStatus, NodePath};

#[derive(Debug, Clone, PartialEq)]
pub enum CookEvent {
    StatusChanged {
        path: NodePath,
        status: CookStatus,
    },
    Published {
        target: NodePath,
        time: f64,
        elements: usize,
    },
    JobFinished {
        target: NodePath,
        outcome: JobOutcome,
        cooked: usize,
    },
}

#[derive(Clone, Default)]
pub struct CookEventBus {
    subscribers: Arc<RwLock<Vec<Sender<CookEvent>>>>,
}

impl CookEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<CookEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(tx);
        rx
    }

    pub fn emit(&self, event: CookEvent) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

impl std::fmt::Debug for CookEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookEventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_forget_dropped() {
        let bus = CookEventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();
        drop(b);

        let event = CookEvent::StatusChanged {
            path: NodePath::parse("/x"),
            status: CookStatus::Cooked,
        };
        bus.emit(event.clone());
        assert_eq!(a.try_recv().unwrap(), event);
        assert_eq!(bus.subscriber_count(), 1);
    }
}
