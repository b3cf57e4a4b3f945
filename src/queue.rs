//! Bounded inbound message queue.
//!
//! SPSC: the real-time callback pushes, the application thread pops.
//! Push never blocks and never grows the queue; on overflow the newest
//! message is dropped and counted.

use crate::message::MidiMessage;
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Producer side -- push messages from the real-time callback.
pub struct QueueProducer {
    producer: HeapProd<MidiMessage>,
    dropped: Arc<AtomicU64>,
}

impl QueueProducer {
    /// Returns `false` if the queue was full and the message was dropped.
    /// Never blocks; safe on the real-time thread.
    #[inline]
    pub fn push(&mut self, message: MidiMessage) -> bool {
        match self.producer.try_push(message) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

/// Consumer side -- drain messages from the application thread.
pub struct QueueConsumer {
    consumer: HeapCons<MidiMessage>,
    dropped: Arc<AtomicU64>,
}

impl QueueConsumer {
    #[inline]
    pub fn pop(&mut self) -> Option<MidiMessage> {
        self.consumer.try_pop()
    }

    #[inline]
    pub fn pending_count(&self) -> usize {
        self.consumer.occupied_len()
    }

    /// Total messages lost to overflow since construction.
    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

pub fn queue_pair(capacity: usize) -> (QueueProducer, QueueConsumer) {
    let rb = HeapRb::new(capacity);
    let (producer, consumer) = rb.split();
    let dropped = Arc::new(AtomicU64::new(0));
    (
        QueueProducer {
            producer,
            dropped: Arc::clone(&dropped),
        },
        QueueConsumer { consumer, dropped },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order() {
        let (mut tx, mut rx) = queue_pair(8);
        for note in [60u8, 62, 64, 65] {
            assert!(tx.push(MidiMessage::note_on(0, note, 100)));
        }
        for note in [60u8, 62, 64, 65] {
            assert_eq!(rx.pop().unwrap().bytes[1], note);
        }
        assert!(rx.pop().is_none());
    }

    #[test]
    fn test_overflow_drops_newest_and_counts() {
        let (mut tx, mut rx) = queue_pair(2);
        assert!(tx.push(MidiMessage::note_on(0, 60, 100)));
        assert!(tx.push(MidiMessage::note_on(0, 62, 100)));
        assert!(!tx.push(MidiMessage::note_on(0, 64, 100)));
        assert!(!tx.push(MidiMessage::note_on(0, 65, 100)));

        assert_eq!(rx.dropped_count(), 2);

        // Existing entries intact, newest ones gone
        assert_eq!(rx.pop().unwrap().bytes[1], 60);
        assert_eq!(rx.pop().unwrap().bytes[1], 62);
        assert!(rx.pop().is_none());
    }

    #[test]
    fn test_pending_count() {
        let (mut tx, mut rx) = queue_pair(8);
        assert_eq!(rx.pending_count(), 0);
        tx.push(MidiMessage::note_on(0, 60, 100));
        tx.push(MidiMessage::note_off(0, 60, 0));
        assert_eq!(rx.pending_count(), 2);
        rx.pop();
        assert_eq!(rx.pending_count(), 1);
    }

    #[test]
    fn test_drains_after_overflow() {
        let (mut tx, mut rx) = queue_pair(1);
        tx.push(MidiMessage::note_on(0, 60, 100));
        tx.push(MidiMessage::note_on(0, 61, 100));
        rx.pop();
        // Room again after draining
        assert!(tx.push(MidiMessage::note_on(0, 62, 100)));
        assert_eq!(rx.pop().unwrap().bytes[1], 62);
    }
}
