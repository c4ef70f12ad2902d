//! Epoch confirmation plumbing.

use std::sync::{Arc, RwLock};

use tsm_types::Epoch;

/// Receives epoch confirmations.
pub trait EpochSubscriber: Send + Sync {
    fn epoch_confirmed(&self, epoch: Epoch);
}

/// Source of epoch confirmations.
pub trait EpochNotifier: Send + Sync {
    /// Subscribe `handler` to every future confirmation. Implementations may
    /// also deliver the current epoch immediately.
    fn register_handler(&self, handler: Arc<dyn EpochSubscriber>);
}

#[derive(Default)]
struct HubState {
    current: Option<Epoch>,
    handlers: Vec<Arc<dyn EpochSubscriber>>,
}

/// In-process epoch notifier.
///
/// New handlers are told the current epoch right away, so a component built
/// mid-chain starts from the same state as one that saw every confirmation.
#[derive(Default)]
pub struct EpochNotifierHub {
    state: RwLock<HubState>,
}

impl EpochNotifierHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hub that already knows the chain is at `epoch`.
    pub fn starting_at(epoch: Epoch) -> Self {
        Self {
            state: RwLock::new(HubState {
                current: Some(epoch),
                handlers: Vec::new(),
            }),
        }
    }

    pub fn current_epoch(&self) -> Option<Epoch> {
        self.state.read().expect("lock poisoned").current
    }

    pub fn handler_count(&self) -> usize {
        self.state.read().expect("lock poisoned").handlers.len()
    }

    /// Confirm `epoch` and notify every handler.
    pub fn check_epoch(&self, epoch: Epoch) {
        let handlers = {
            let mut state = self.state.write().expect("lock poisoned");
            state.current = Some(epoch);
            state.handlers.clone()
        };
        for handler in handlers {
            handler.epoch_confirmed(epoch);
        }
    }
}

impl EpochNotifier for EpochNotifierHub {
    fn register_handler(&self, handler: Arc<dyn EpochSubscriber>) {
        let current = {
            let mut state = self.state.write().expect("lock poisoned");
            state.handlers.push(Arc::clone(&handler));
            state.current
        };
        if let Some(epoch) = current {
            handler.epoch_confirmed(epoch);
        }
    }
}
