//! Outbound bridge: application messages -> ring buffer -> hardware buffer.
//!
//! Application threads enqueue through [`MidiOutput::send_message`]; once per
//! cycle the real-time half drains the ring into the driver's output buffer,
//! preserving order, and answers any pending teardown request. Closing the
//! port runs the two-phase handshake so buffers are never freed under a
//! running callback.

use crate::driver::{MidiDriver, OutputCycle, PortDirection, PortId, ProcessHandler};
use crate::error::{Error, Result};
use crate::ring::{ring_pair, RingConsumer, RingProducer, DEFAULT_RING_BYTES};
use crate::teardown::{teardown_pair, TeardownRequester, TeardownResponder};
use parking_lot::Mutex;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_TEARDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// State shared with the process handler; the real-time side's whole world.
struct OutputShared {
    registered: AtomicBool,
    consumer: UnsafeCell<RingConsumer>,
    responder: TeardownResponder,
}

// SAFETY: OutputShared is Sync because the UnsafeCell ring consumer is only
// accessed from the process handler, which the driver invokes from a single
// thread; the responder half is non-blocking and owned by that same thread.
unsafe impl Sync for OutputShared {}

impl OutputShared {
    /// One audio cycle on the real-time thread. All queued messages are
    /// emitted at the start-of-cycle frame offset; intra-cycle send timing is
    /// an accepted approximation.
    fn process_cycle(&self, _frames: u32, cycle: &mut dyn OutputCycle) {
        if self.registered.load(Ordering::Acquire) {
            cycle.clear();

            // SAFETY: single-threaded access from the driver's process
            // thread (SPSC invariant).
            let consumer = unsafe { &mut *self.consumer.get() };
            while let Some(size) = consumer.next_size() {
                match cycle.reserve(0, size) {
                    Some(region) => consumer.read_payload(region),
                    // Hardware buffer full: drop this message but keep the
                    // size/payload channels paired, and keep draining.
                    None => consumer.skip_payload(size),
                }
            }
        }

        // Teardown can be requested at any moment, port or no port.
        self.responder.acknowledge_if_requested();
    }
}

/// One logical MIDI output endpoint.
pub struct MidiOutput {
    driver: Arc<dyn MidiDriver>,
    client_name: String,
    connected: bool,
    port: Option<PortId>,
    /// App-side producer half. The lock makes `send_message` callable from
    /// any non-real-time thread; the real-time consumer never takes it.
    producer: Mutex<RingProducer>,
    requester: TeardownRequester,
    teardown_timeout: Duration,
    shared: Arc<OutputShared>,
}

pub struct MidiOutputBuilder {
    driver: Arc<dyn MidiDriver>,
    client_name: String,
    ring_bytes: usize,
    teardown_timeout: Duration,
}

impl MidiOutputBuilder {
    /// Payload capacity of the outbound ring buffer, in bytes.
    pub fn ring_bytes(mut self, bytes: usize) -> Self {
        self.ring_bytes = bytes;
        self
    }

    /// Grace period `close_port` waits for the callback's acknowledgment.
    pub fn teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout = timeout;
        self
    }

    pub fn build(self) -> MidiOutput {
        let (producer, consumer) = ring_pair(self.ring_bytes);
        let (requester, responder) = teardown_pair();
        MidiOutput {
            driver: self.driver,
            client_name: self.client_name,
            connected: false,
            port: None,
            producer: Mutex::new(producer),
            requester,
            teardown_timeout: self.teardown_timeout,
            shared: Arc::new(OutputShared {
                registered: AtomicBool::new(false),
                consumer: UnsafeCell::new(consumer),
                responder,
            }),
        }
    }
}

impl MidiOutput {
    pub fn new(driver: Arc<dyn MidiDriver>, client_name: impl Into<String>) -> Self {
        Self::builder(driver, client_name).build()
    }

    pub fn builder(
        driver: Arc<dyn MidiDriver>,
        client_name: impl Into<String>,
    ) -> MidiOutputBuilder {
        MidiOutputBuilder {
            driver,
            client_name: client_name.into(),
            ring_bytes: DEFAULT_RING_BYTES,
            teardown_timeout: DEFAULT_TEARDOWN_TIMEOUT,
        }
    }

    fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let shared = Arc::clone(&self.shared);
        let handler = ProcessHandler::Output(Box::new(move |frames, cycle| {
            shared.process_cycle(frames, cycle)
        }));
        match self.driver.connect_client(&self.client_name, handler) {
            Ok(()) => {
                self.connected = true;
                true
            }
            Err(e) => {
                warn!("MIDI driver not running? {e}");
                false
            }
        }
    }

    fn register(&mut self, port_name: &str) -> Result<PortId> {
        if let Some(port) = self.port {
            return Ok(port);
        }
        let port = self.driver.register_port(PortDirection::Output, port_name)?;
        self.port = Some(port);
        self.shared.registered.store(true, Ordering::Release);
        Ok(port)
    }

    /// Open a port named `port_name` and connect it to the `index`-th
    /// available destination.
    pub fn open_port(&mut self, index: usize, port_name: &str) -> Result<()> {
        if !self.connect() {
            return Err(Error::Driver("driver not running".into()));
        }
        let port = self.register(port_name)?;

        let destination = self.get_port_name(index);
        if destination.is_empty() {
            return Ok(());
        }
        let own_name = self.driver.port_name(port)?;
        self.driver.connect_ports(&own_name, &destination)?;
        debug!("MIDI output '{own_name}' connected to '{destination}'");
        Ok(())
    }

    /// Open a port without connecting it to any destination.
    pub fn open_virtual_port(&mut self, port_name: &str) -> Result<()> {
        if !self.connect() {
            return Err(Error::Driver("driver not running".into()));
        }
        self.register(port_name)?;
        Ok(())
    }

    /// Close the port after the teardown handshake.
    ///
    /// Raises the stop request and waits up to the configured timeout for
    /// the callback's acknowledgment, then unregisters regardless. Buffered
    /// messages are flushed only as far as the callback got before the
    /// handshake completed (best effort). The ring itself is shared with the
    /// process handler through an `Arc`, so even an acknowledgment that
    /// never arrives cannot leave the callback reading freed memory.
    pub fn close_port(&mut self) {
        let Some(port) = self.port.take() else {
            return;
        };

        if !self.requester.request_and_wait(self.teardown_timeout) {
            warn!(
                "MIDI output teardown not acknowledged within {:?}; closing anyway",
                self.teardown_timeout
            );
        }

        self.shared.registered.store(false, Ordering::Release);
        if let Err(e) = self.driver.unregister_port(port) {
            warn!("failed to unregister MIDI output port: {e}");
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Enqueue one wire-format message for the next cycle's drain.
    ///
    /// Callable from any thread except the real-time callback. Fails with
    /// [`Error::RingFull`] when the ring has no room; nothing is partially
    /// written.
    pub fn send_message(&self, bytes: &[u8]) -> Result<()> {
        self.producer.lock().push(bytes)
    }

    /// Number of destinations this endpoint could connect to.
    pub fn get_port_count(&mut self) -> usize {
        if !self.connect() {
            return 0;
        }
        // Destinations are the driver's input-capable ports.
        match self.driver.port_names(PortDirection::Input) {
            Ok(names) => names.len(),
            Err(e) => {
                warn!("MIDI port enumeration failed: {e}");
                0
            }
        }
    }

    /// Name of the `index`-th available destination; empty (with a warning)
    /// on a stale index.
    pub fn get_port_name(&mut self, index: usize) -> String {
        if !self.connect() {
            return String::new();
        }
        let names = match self.driver.port_names(PortDirection::Input) {
            Ok(names) => names,
            Err(e) => {
                warn!("no MIDI destination ports available: {e}");
                return String::new();
            }
        };
        match names.into_iter().nth(index) {
            Some(name) => name,
            None => {
                warn!("MIDI destination port index {index} is invalid");
                String::new()
            }
        }
    }

    /// Rename the open port. Reports `Unsupported` for drivers without
    /// rename support.
    pub fn set_port_name(&self, port_name: &str) -> Result<()> {
        let Some(port) = self.port else {
            return Err(Error::Port("no port open".into()));
        };
        self.driver.rename_port(port, port_name).inspect_err(|e| {
            warn!("MIDI output port rename failed: {e}");
        })
    }
}

impl Drop for MidiOutput {
    fn drop(&mut self) {
        self.close_port();
    }
}

impl std::fmt::Debug for MidiOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiOutput")
            .field("client_name", &self.client_name)
            .field("connected", &self.connected)
            .field("open", &self.port.is_some())
            .finish()
    }
}
