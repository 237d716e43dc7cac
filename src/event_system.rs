//! Deferred GPU event queue
//!
//! Descriptor pools and sets must not be created while a command buffer is
//! mid-recording, so classification posts its GPU-side work here and the
//! render thread drains the queue once per frame, before recording starts.
//! Events run in posting order; draining an empty queue is free.

use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::renderer::device::RenderDevice;

/// A unit of deferred GPU work
pub type GpuEvent = Box<dyn FnOnce(&dyn RenderDevice) + Send>;

/// Submit-and-continue queue for pre-render GPU work
#[derive(Default)]
pub struct GpuEventQueue {
    pending: Mutex<VecDeque<GpuEvent>>,
}

impl GpuEventQueue {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// Queue an event for the next pre-render drain
    pub fn post(&self, event: GpuEvent) {
        self.pending.lock().push_back(event);
    }

    /// Run every pending event against `device`, in posting order.
    /// Returns the number of events executed.
    pub fn drain(&self, device: &dyn RenderDevice) -> usize {
        // Swap the queue out so handlers can post follow-up events
        // without deadlocking on the lock.
        let mut events = {
            let mut pending = self.pending.lock();
            std::mem::take(&mut *pending)
        };

        let count = events.len();

        for event in events.drain(..) {
            event(device);
        }

        if count > 0 {
            log::debug!("[GpuEventQueue::drain] Executed {} deferred events", count);
        }

        count
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::mock::MockDevice;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_events_run_in_posting_order() {
        let queue = GpuEventQueue::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..3 {
            let order = Arc::clone(&order);
            queue.post(Box::new(move |_| order.lock().push(i)));
        }

        let device = MockDevice::new();
        assert_eq!(queue.drain(&device), 3);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_event_may_post_follow_up() {
        let queue = Arc::new(GpuEventQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let inner_queue = Arc::clone(&queue);
        let inner_ran = Arc::clone(&ran);
        queue.post(Box::new(move |_| {
            let ran = Arc::clone(&inner_ran);
            inner_queue.post(Box::new(move |_| {
                ran.fetch_add(1, Ordering::Relaxed);
            }));
        }));

        let device = MockDevice::new();
        queue.drain(&device);
        assert_eq!(ran.load(Ordering::Relaxed), 0);
        assert_eq!(queue.len(), 1);

        queue.drain(&device);
        assert_eq!(ran.load(Ordering::Relaxed), 1);
    }
}
