use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One slot of the packet queue.
///
/// `Flush` is the in-band marker left behind by a queue flush: the decoder
/// must reset its codec buffers before touching any later packet.
pub enum PacketEntry {
    Packet(ffmpeg::Packet),
    Flush,
}

struct PacketQueueInner {
    entries: VecDeque<PacketEntry>,
    capacity: usize,
}

/// Bounded queue of compressed packets for one stream.
///
/// Single pusher (the demuxer), single popper (the stream's decoder worker).
/// Overflow drops the oldest packet: keeping real time matters more than
/// keeping every packet.
pub struct PacketQueue {
    inner: Mutex<PacketQueueInner>,
    not_empty: Condvar,
}

impl PacketQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PacketQueueInner {
                entries: VecDeque::with_capacity(capacity),
                capacity,
            }),
            not_empty: Condvar::new(),
        }
    }

    /// Enqueue a packet, discarding the oldest queued packet on overflow.
    pub fn push(&self, packet: ffmpeg::Packet) {
        let mut inner = self.inner.lock();

        if inner.entries.len() >= inner.capacity {
            // Never discard a flush marker; the decoder has to see it.
            let victim = inner
                .entries
                .iter()
                .position(|e| matches!(e, PacketEntry::Packet(_)));
            if let Some(at) = victim {
                inner.entries.remove(at);
            }
        }

        inner.entries.push_back(PacketEntry::Packet(packet));
        self.not_empty.notify_one();
    }

    /// Drop every queued packet and leave a flush marker for the decoder.
    pub fn flush(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.entries.push_back(PacketEntry::Flush);
        self.not_empty.notify_one();
    }

    /// Dequeue one entry, waiting up to `timeout` for the queue to become
    /// non-empty. Returns `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<PacketEntry> {
        let mut inner = self.inner.lock();
        if inner.entries.is_empty() {
            let _ = self.not_empty.wait_for(&mut inner, timeout);
        }
        inner.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_of(capacity: usize, packets: usize) -> PacketQueue {
        let q = PacketQueue::new(capacity);
        for _ in 0..packets {
            q.push(ffmpeg::Packet::empty());
        }
        q
    }

    #[test]
    fn overflow_drops_oldest_and_caps_len() {
        let q = PacketQueue::new(4);
        for i in 0..5i64 {
            let mut p = ffmpeg::Packet::empty();
            p.set_pts(Some(i));
            q.push(p);
        }
        assert_eq!(q.len(), 4);

        // The survivor at the front is packet 1; packet 0 was discarded.
        match q.pop_timeout(Duration::ZERO) {
            Some(PacketEntry::Packet(p)) => assert_eq!(p.pts(), Some(1)),
            _ => panic!("expected a packet at the front"),
        }
    }

    #[test]
    fn flush_clears_and_leaves_single_marker() {
        let q = queue_of(8, 5);
        q.flush();
        assert_eq!(q.len(), 1);
        assert!(matches!(q.pop_timeout(Duration::ZERO), Some(PacketEntry::Flush)));
        assert!(q.is_empty());
    }

    #[test]
    fn overflow_never_evicts_flush_marker() {
        let q = PacketQueue::new(2);
        q.flush();
        q.push(ffmpeg::Packet::empty());
        q.push(ffmpeg::Packet::empty());
        // Queue was full; the packet, not the marker, must have been dropped.
        assert!(matches!(q.pop_timeout(Duration::ZERO), Some(PacketEntry::Flush)));
    }

    #[test]
    fn pop_times_out_on_empty_queue() {
        let q = PacketQueue::new(4);
        let started = std::time::Instant::now();
        assert!(q.pop_timeout(Duration::from_millis(20)).is_none());
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn push_wakes_a_waiting_popper() {
        use std::sync::Arc;

        let q = Arc::new(PacketQueue::new(4));
        let waiter = {
            let q = Arc::clone(&q);
            std::thread::spawn(move || q.pop_timeout(Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        q.push(ffmpeg::Packet::empty());
        let got = waiter.join().unwrap();
        assert!(matches!(got, Some(PacketEntry::Packet(_))));
    }
}
