use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{ManagerError, ManagerResult};

/// Admission control for background snapshot/checkpoint workers.
///
/// The dispatcher polls [`can_process`](Throttler::can_process) and only then
/// calls [`start_processing`](Throttler::start_processing); each started
/// worker calls [`end_processing`](Throttler::end_processing) exactly once.
pub trait Throttler: Send + Sync {
    fn can_process(&self) -> bool;

    fn start_processing(&self);

    fn end_processing(&self);
}

/// Throttler bounding the number of concurrently running tasks.
#[derive(Debug)]
pub struct NumTasksThrottler {
    max: usize,
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl NumTasksThrottler {
    pub fn new(max: usize) -> ManagerResult<Self> {
        if max == 0 {
            return Err(ManagerError::InvalidConfig(
                "throttler needs at least one slot".into(),
            ));
        }
        Ok(Self {
            max,
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        })
    }

    pub fn max(&self) -> usize {
        self.max
    }

    /// Tasks currently holding a slot.
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of slots ever held at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl Throttler for NumTasksThrottler {
    fn can_process(&self) -> bool {
        self.current.load(Ordering::SeqCst) < self.max
    }

    fn start_processing(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn end_processing(&self) {
        let _ = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }
}
