//! Realtime-safe MIDI bridge.
//!
//! Moves variable-length MIDI messages between a hard real-time audio
//! callback and ordinary application threads: inbound events are delta-
//! timestamped and handed to a callback or a bounded queue, outbound
//! messages travel through a lock-free two-channel ring buffer, and a
//! two-phase handshake sequences teardown against the running callback.
//!
//! The backend itself (client setup, port plumbing, cycle scheduling) is a
//! collaborator behind the [`MidiDriver`] trait; one endpoint instance wraps
//! exactly one input or output port.

pub mod error;
pub use error::{Error, Result};

mod message;
pub use message::{DeltaClock, MidiMessage, INLINE_MESSAGE_BYTES};

pub mod driver;
pub use driver::{
    InputCycle, MidiDriver, OutputCycle, PortDirection, PortId, ProcessHandler, RawEvent,
};

pub(crate) mod queue;
pub use queue::{queue_pair, QueueConsumer, QueueProducer};

pub(crate) mod ring;
pub use ring::{ring_pair, RingConsumer, RingProducer, DEFAULT_RING_BYTES};

pub(crate) mod teardown;
pub use teardown::{teardown_pair, TeardownRequester, TeardownResponder};

mod input;
pub use input::{MessageCallback, MidiInput, MidiInputBuilder};

mod output;
pub use output::{MidiOutput, MidiOutputBuilder};
