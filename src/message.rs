//! Wire-format MIDI messages and delta-time bookkeeping.

use smallvec::SmallVec;
use std::time::Instant;

/// Messages up to this size are stored inline, so copying an ordinary
/// channel-voice message on the real-time thread never allocates.
pub const INLINE_MESSAGE_BYTES: usize = 16;

/// A raw MIDI message as it appeared on the wire, stamped with the elapsed
/// time in seconds since the previous message on the same endpoint.
///
/// The first message after a (re)opened port carries a timestamp of 0.0.
#[derive(Debug, Clone, PartialEq)]
pub struct MidiMessage {
    pub bytes: SmallVec<[u8; INLINE_MESSAGE_BYTES]>,
    pub timestamp: f64,
}

impl MidiMessage {
    /// Byte-for-byte copy of a wire message, timestamp 0.0.
    pub fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: SmallVec::from_slice(bytes),
            timestamp: 0.0,
        }
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        let channel = channel.min(15); // MIDI channels are 0-15
        Self::new(&[0x90 | channel, note & 0x7F, velocity & 0x7F])
    }

    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        let channel = channel.min(15);
        Self::new(&[0x80 | channel, note & 0x7F, velocity & 0x7F])
    }

    pub fn control_change(channel: u8, cc_number: u8, value: u8) -> Self {
        let channel = channel.min(15);
        Self::new(&[0xB0 | channel, cc_number & 0x7F, value & 0x7F])
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        let channel = channel.min(15);
        Self::new(&[0xC0 | channel, program & 0x7F])
    }

    /// `value`: signed 14-bit (-8192 to 8191).
    pub fn pitch_bend(channel: u8, value: i16) -> Self {
        let channel = channel.min(15);
        let unsigned = (value as i32 + 8192).clamp(0, 16383) as u16;
        let lsb = (unsigned & 0x7F) as u8;
        let msb = ((unsigned >> 7) & 0x7F) as u8;
        Self::new(&[0xE0 | channel, lsb, msb])
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Delta-time reference for one endpoint.
///
/// Only the real-time thread touches this. The reference instant is updated
/// on every event, including the first, so each delta spans exactly one
/// inter-event gap.
#[derive(Debug, Default)]
pub struct DeltaClock {
    last: Option<Instant>,
}

impl DeltaClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seconds elapsed since the previous call; 0.0 for the first call.
    #[inline]
    pub fn delta(&mut self, now: Instant) -> f64 {
        match self.last.replace(now) {
            Some(prev) => now.duration_since(prev).as_secs_f64(),
            None => 0.0,
        }
    }

    /// Forget the reference so the next event reads as first again.
    /// Called when a port is reopened.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cc_message_creation() {
        let msg = MidiMessage::control_change(0, 7, 127);
        assert_eq!(msg.bytes.as_slice(), &[0xB0, 7, 127]);

        let msg = MidiMessage::control_change(15, 64, 0);
        assert_eq!(msg.bytes.as_slice(), &[0xBF, 64, 0]);
    }

    #[test]
    fn test_note_messages() {
        let msg = MidiMessage::note_on(0, 60, 100);
        assert_eq!(msg.bytes.as_slice(), &[0x90, 60, 100]);

        let msg = MidiMessage::note_off(3, 64, 0);
        assert_eq!(msg.bytes.as_slice(), &[0x83, 64, 0]);
    }

    #[test]
    fn test_pitch_bend_range() {
        let center = MidiMessage::pitch_bend(0, 0);
        assert_eq!(
            (center.bytes[1] as u16) | ((center.bytes[2] as u16) << 7),
            8192
        );

        let up = MidiMessage::pitch_bend(0, 8191);
        assert_eq!((up.bytes[1] as u16) | ((up.bytes[2] as u16) << 7), 16383);

        let down = MidiMessage::pitch_bend(0, -8192);
        assert_eq!((down.bytes[1] as u16) | ((down.bytes[2] as u16) << 7), 0);
    }

    #[test]
    fn test_channel_clamp_and_data_mask() {
        let msg = MidiMessage::note_on(200, 0xFF, 0xFF);
        assert_eq!(msg.bytes[0], 0x9F); // 0x90 | 15
        assert_eq!(msg.bytes[1], 0x7F);
        assert_eq!(msg.bytes[2], 0x7F);

        let msg = MidiMessage::program_change(16, 0xFF);
        assert_eq!(msg.bytes[0], 0xCF);
        assert_eq!(msg.bytes[1], 0x7F);
    }

    #[test]
    fn test_new_copies_bytes_exactly() {
        let raw = [0xF0, 0x7E, 0x00, 0x09, 0x01, 0xF7];
        let msg = MidiMessage::new(&raw);
        assert_eq!(msg.bytes.as_slice(), &raw);
        assert_eq!(msg.timestamp, 0.0);
    }

    #[test]
    fn test_delta_clock_first_is_zero() {
        let mut clock = DeltaClock::new();
        assert_eq!(clock.delta(Instant::now()), 0.0);
    }

    #[test]
    fn test_delta_clock_measures_gap() {
        let mut clock = DeltaClock::new();
        let t0 = Instant::now();
        clock.delta(t0);

        let t1 = t0 + Duration::from_millis(250);
        let delta = clock.delta(t1);
        assert!((delta - 0.25).abs() < 1e-9);

        // Reference moved to t1, not t0
        let t2 = t1 + Duration::from_millis(100);
        let delta = clock.delta(t2);
        assert!((delta - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_delta_clock_reset() {
        let mut clock = DeltaClock::new();
        let t0 = Instant::now();
        clock.delta(t0);
        clock.reset();
        assert_eq!(clock.delta(t0 + Duration::from_secs(5)), 0.0);
    }
}
