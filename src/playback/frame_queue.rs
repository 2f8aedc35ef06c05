use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

struct QueueInner<T> {
    frames: VecDeque<T>,
    capacity: usize,
}

/// Bounded queue of decoded frames for one stream.
///
/// Same shape as the packet queue: single pusher (the decoder worker),
/// single popper (the presenter or the audio callback), drop-oldest on
/// overflow. The audio callback only ever uses the non-waiting pop, so the
/// lock is held for no longer than one queue operation.
pub struct FrameQueue<T> {
    inner: Mutex<QueueInner<T>>,
    not_empty: Condvar,
}

impl<T> FrameQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                frames: VecDeque::with_capacity(capacity),
                capacity,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue a frame, discarding the oldest queued frame on overflow.
    pub fn push(&self, frame: T) {
        let mut inner = self.inner.lock();
        if inner.frames.len() >= inner.capacity {
            inner.frames.pop_front();
        }
        inner.frames.push_back(frame);
        self.not_empty.notify_one();
    }

    /// Dequeue one frame, waiting up to `timeout` for the queue to become
    /// non-empty. Returns `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut inner = self.inner.lock();
        if inner.frames.is_empty() {
            let _ = self.not_empty.wait_for(&mut inner, timeout);
        }
        inner.frames.pop_front()
    }

    /// Dequeue without waiting. Used from the audio callback, which must not
    /// block its caller.
    pub fn try_pop(&self) -> Option<T> {
        self.inner.lock().frames.pop_front()
    }

    /// Drop every queued frame.
    pub fn flush(&self) {
        self.inner.lock().frames.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }
}
