//! Outbound ring buffer: two SPSC channels in lockstep.
//!
//! The application thread appends a message as a size token plus its payload
//! bytes; the real-time callback reads them back in the same pairing and
//! order. The size token is written *last*, so a visible token always has its
//! payload fully available -- the consumer can never observe a partial write,
//! and capacity is checked for both channels before either is touched.

use crate::error::{Error, Result};
use ringbuf::{traits::*, HeapCons, HeapProd, HeapRb};

/// Matches the ring size the JACK MIDI world has used for years.
pub const DEFAULT_RING_BYTES: usize = 16384;

const SIZE_TOKEN_BYTES: usize = 4;

/// Producer side -- append whole messages from application threads.
pub struct RingProducer {
    sizes: HeapProd<u32>,
    payload: HeapProd<u8>,
    payload_capacity: usize,
}

impl RingProducer {
    /// Append one message as a logically atomic size + payload pair.
    ///
    /// Never blocks. On `RingFull` nothing has been written to either
    /// channel.
    pub fn push(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() > self.payload_capacity {
            return Err(Error::MessageTooLarge {
                size: bytes.len(),
                capacity: self.payload_capacity,
            });
        }
        if self.sizes.vacant_len() == 0 || self.payload.vacant_len() < bytes.len() {
            return Err(Error::RingFull { needed: bytes.len() });
        }

        let written = self.payload.push_slice(bytes);
        debug_assert_eq!(written, bytes.len());
        // Token last: publishing the size is the commit point.
        let pushed = self.sizes.try_push(bytes.len() as u32);
        debug_assert!(pushed.is_ok());
        Ok(())
    }
}

/// Consumer side -- drain messages from the real-time callback.
///
/// The drain loop is driven by size tokens: pop a token, then read (or skip)
/// exactly that many payload bytes before popping the next token.
pub struct RingConsumer {
    sizes: HeapCons<u32>,
    payload: HeapCons<u8>,
}

impl RingConsumer {
    /// Size of the next queued message, consuming its token.
    #[inline]
    pub fn next_size(&mut self) -> Option<usize> {
        self.sizes.try_pop().map(|s| s as usize)
    }

    /// Read exactly `buf.len()` payload bytes for the token just popped.
    #[inline]
    pub fn read_payload(&mut self, buf: &mut [u8]) {
        let read = self.payload.pop_slice(buf);
        // The producer commits payload before token, so this cannot come
        // up short.
        debug_assert_eq!(read, buf.len());
    }

    /// Discard the payload of the token just popped (e.g. when the hardware
    /// buffer had no room), keeping the channels paired.
    #[inline]
    pub fn skip_payload(&mut self, count: usize) {
        let skipped = self.payload.skip(count);
        debug_assert_eq!(skipped, count);
    }

    #[inline]
    pub fn pending_messages(&self) -> usize {
        self.sizes.occupied_len()
    }
}

/// Create a paired producer/consumer over `capacity_bytes` of payload.
/// The size channel holds one token per possible minimal message.
pub fn ring_pair(capacity_bytes: usize) -> (RingProducer, RingConsumer) {
    let payload_capacity = capacity_bytes.max(SIZE_TOKEN_BYTES);
    let sizes_rb = HeapRb::new(payload_capacity / SIZE_TOKEN_BYTES);
    let payload_rb = HeapRb::new(payload_capacity);
    let (sizes_tx, sizes_rx) = sizes_rb.split();
    let (payload_tx, payload_rx) = payload_rb.split();
    (
        RingProducer {
            sizes: sizes_tx,
            payload: payload_tx,
            payload_capacity,
        },
        RingConsumer {
            sizes: sizes_rx,
            payload: payload_rx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain_one(rx: &mut RingConsumer) -> Option<Vec<u8>> {
        let size = rx.next_size()?;
        let mut buf = vec![0u8; size];
        rx.read_payload(&mut buf);
        Some(buf)
    }

    #[test]
    fn test_roundtrip_order() {
        let (mut tx, mut rx) = ring_pair(64);
        tx.push(&[0x90, 60, 100]).unwrap();
        tx.push(&[0xB0, 7, 127]).unwrap();
        tx.push(&[0x80, 60, 0]).unwrap();

        assert_eq!(rx.pending_messages(), 3);
        assert_eq!(drain_one(&mut rx).unwrap(), vec![0x90, 60, 100]);
        assert_eq!(drain_one(&mut rx).unwrap(), vec![0xB0, 7, 127]);
        assert_eq!(drain_one(&mut rx).unwrap(), vec![0x80, 60, 0]);
        assert!(rx.next_size().is_none());
    }

    #[test]
    fn test_variable_length_messages_stay_paired() {
        let (mut tx, mut rx) = ring_pair(64);
        tx.push(&[0xC0, 5]).unwrap();
        tx.push(&[0xF0, 0x7E, 0x00, 0x09, 0x01, 0xF7]).unwrap();
        tx.push(&[0xF8]).unwrap();

        assert_eq!(drain_one(&mut rx).unwrap().len(), 2);
        assert_eq!(drain_one(&mut rx).unwrap().len(), 6);
        assert_eq!(drain_one(&mut rx).unwrap(), vec![0xF8]);
    }

    #[test]
    fn test_full_rejects_without_partial_write() {
        let (mut tx, mut rx) = ring_pair(8);
        tx.push(&[1, 2, 3, 4, 5, 6]).unwrap();

        // 6 of 8 payload bytes used; a 3-byte message must be rejected whole
        let err = tx.push(&[7, 8, 9]).unwrap_err();
        assert!(matches!(err, Error::RingFull { needed: 3 }));

        // Only the first message is observable
        assert_eq!(drain_one(&mut rx).unwrap(), vec![1, 2, 3, 4, 5, 6]);
        assert!(rx.next_size().is_none());

        // And the rejected push left room for a retry after draining
        tx.push(&[7, 8, 9]).unwrap();
        assert_eq!(drain_one(&mut rx).unwrap(), vec![7, 8, 9]);
    }

    #[test]
    fn test_oversized_message_rejected() {
        let (mut tx, _rx) = ring_pair(8);
        let big = [0u8; 16];
        assert!(matches!(
            tx.push(&big),
            Err(Error::MessageTooLarge { size: 16, capacity: 8 })
        ));
    }

    #[test]
    fn test_skip_payload_keeps_pairing() {
        let (mut tx, mut rx) = ring_pair(64);
        tx.push(&[0x90, 60, 100]).unwrap();
        tx.push(&[0x90, 64, 100]).unwrap();

        // Drop the first message the way the drain path does on reserve
        // failure
        let size = rx.next_size().unwrap();
        rx.skip_payload(size);

        assert_eq!(drain_one(&mut rx).unwrap(), vec![0x90, 64, 100]);
    }

    #[test]
    fn test_wraparound() {
        let (mut tx, mut rx) = ring_pair(8);
        for round in 0..10u8 {
            tx.push(&[round, round, round]).unwrap();
            assert_eq!(drain_one(&mut rx).unwrap(), vec![round; 3]);
        }
    }
}
