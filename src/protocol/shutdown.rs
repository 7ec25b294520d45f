use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};

use log::warn;
use mio::Waker;

/// Cloneable interrupt handle for an event loop.
///
/// Triggering it from any thread (typically a `ctrlc` handler) sets a flag and
/// wakes the attached loop out of its poll, so a server blocked without a
/// timeout still notices and drains.
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    waker: Mutex<Option<Waker>>,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        if let Some(waker) = self.waker().as_ref() {
            if let Err(e) = waker.wake() {
                warn!("failed to wake event loop: {e}");
            }
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// Points the handle at a new event loop.
    pub(crate) fn attach(&self, waker: Waker) {
        let mut slot = self.waker();
        *slot = Some(waker);
        if self.is_triggered() {
            if let Some(waker) = slot.as_ref() {
                if let Err(e) = waker.wake() {
                    warn!("failed to wake event loop: {e}");
                }
            }
        }
    }

    fn waker(&self) -> MutexGuard<'_, Option<Waker>> {
        self.inner
            .waker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::{thread, time::Duration};

    use mio::{Events, Poll};

    use super::*;
    use crate::protocol::multiplexer::WAKE;

    #[test]
    fn clones_share_the_flag() {
        let shutdown = Shutdown::new();
        let remote = shutdown.clone();

        assert!(!shutdown.is_triggered());
        remote.trigger();
        assert!(shutdown.is_triggered());
    }

    #[test]
    fn trigger_wakes_attached_poll() {
        let mut poll = Poll::new().unwrap();
        let shutdown = Shutdown::new();
        shutdown.attach(Waker::new(poll.registry(), WAKE).unwrap());

        let remote = shutdown.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            remote.trigger();
        });

        let mut events = Events::with_capacity(4);
        poll.poll(&mut events, Some(Duration::from_secs(5))).unwrap();
        handle.join().unwrap();

        assert!(events.iter().any(|event| event.token() == WAKE));
    }
}
