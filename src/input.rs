//! Inbound bridge: hardware events -> timestamped messages -> application.
//!
//! The per-cycle half runs on the driver's real-time thread and copies each
//! event into a [`MidiMessage`], stamps it with the delta since the previous
//! event, and either invokes the installed callback inline or pushes into the
//! bounded queue. The application half owns the queue consumer and the port
//! lifecycle.

use crate::driver::{InputCycle, MidiDriver, PortDirection, PortId, ProcessHandler};
use crate::error::{Error, Result};
use crate::message::{DeltaClock, MidiMessage};
use crate::queue::{queue_pair, QueueConsumer, QueueProducer};
use arc_swap::ArcSwap;
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Runs inline on the real-time thread; must itself be real-time-safe, which
/// is the caller's contract to honor.
pub type MessageCallback = Box<dyn Fn(MidiMessage) + Send + Sync>;

/// Dispatch mode, decided by the application: a sink callback bypasses the
/// queue entirely.
enum Dispatch {
    Callback(MessageCallback),
    Queue,
}

/// State shared with the process handler. Everything the real-time side
/// touches lives here, passed into the handler as one owned `Arc`.
struct InputShared {
    registered: AtomicBool,
    /// Single-writer (application), single-reader (real-time). While set,
    /// multi-part SysEx continuation fragments are not dispatched.
    continue_sysex: AtomicBool,
    /// Raised by the application on (re)open; the real-time side resets the
    /// delta clock when it sees it, so the clock is only ever touched there.
    reset_clock: AtomicBool,
    dispatch: ArcSwap<Dispatch>,
    clock: UnsafeCell<DeltaClock>,
    producer: UnsafeCell<QueueProducer>,
}

// SAFETY: InputShared is Sync because the UnsafeCell fields (clock, queue
// producer) are only accessed from the process handler, which the driver
// invokes from a single thread; all other fields are atomics or ArcSwap.
unsafe impl Sync for InputShared {}

impl InputShared {
    fn new(producer: QueueProducer) -> Self {
        Self {
            registered: AtomicBool::new(false),
            continue_sysex: AtomicBool::new(false),
            reset_clock: AtomicBool::new(false),
            dispatch: ArcSwap::from_pointee(Dispatch::Queue),
            clock: UnsafeCell::new(DeltaClock::new()),
            producer: UnsafeCell::new(producer),
        }
    }

    /// One audio cycle on the real-time thread. Non-blocking; queue overflow
    /// is counted, never reported from here.
    fn process_cycle(&self, _frames: u32, cycle: &dyn InputCycle) {
        if !self.registered.load(Ordering::Acquire) {
            return;
        }

        // SAFETY: single-threaded access from the driver's process thread
        // (SPSC invariant).
        let clock = unsafe { &mut *self.clock.get() };
        let producer = unsafe { &mut *self.producer.get() };

        if self.reset_clock.swap(false, Ordering::Relaxed) {
            clock.reset();
        }

        let dispatch = self.dispatch.load();
        for index in 0..cycle.event_count() {
            let Some(event) = cycle.event(index) else {
                break;
            };

            let mut message = MidiMessage::new(event.bytes);
            // The reference instant moves on every event, suppressed or not.
            message.timestamp = clock.delta(Instant::now());

            if self.continue_sysex.load(Ordering::Relaxed) {
                continue;
            }

            match &**dispatch {
                Dispatch::Callback(callback) => callback(message),
                Dispatch::Queue => {
                    producer.push(message);
                }
            }
        }
    }
}

/// One logical MIDI input endpoint.
pub struct MidiInput {
    driver: Arc<dyn MidiDriver>,
    client_name: String,
    connected: bool,
    port: Option<PortId>,
    shared: Arc<InputShared>,
    consumer: QueueConsumer,
}

pub struct MidiInputBuilder {
    driver: Arc<dyn MidiDriver>,
    client_name: String,
    queue_capacity: usize,
}

impl MidiInputBuilder {
    /// Maximum messages buffered between cycles before the newest is dropped.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn build(self) -> MidiInput {
        let (producer, consumer) = queue_pair(self.queue_capacity);
        MidiInput {
            driver: self.driver,
            client_name: self.client_name,
            connected: false,
            port: None,
            shared: Arc::new(InputShared::new(producer)),
            consumer,
        }
    }
}

impl MidiInput {
    pub fn new(driver: Arc<dyn MidiDriver>, client_name: impl Into<String>) -> Self {
        Self::builder(driver, client_name).build()
    }

    pub fn builder(driver: Arc<dyn MidiDriver>, client_name: impl Into<String>) -> MidiInputBuilder {
        MidiInputBuilder {
            driver,
            client_name: client_name.into(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    /// Lazily establish the client connection and install the process
    /// handler. Returns whether the endpoint is connected afterwards.
    fn connect(&mut self) -> bool {
        if self.connected {
            return true;
        }
        let shared = Arc::clone(&self.shared);
        let handler = ProcessHandler::Input(Box::new(move |frames, cycle| {
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
        let port = self.driver.register_port(PortDirection::Input, port_name)?;
        self.port = Some(port);
        self.shared.reset_clock.store(true, Ordering::Relaxed);
        self.shared.registered.store(true, Ordering::Release);
        Ok(port)
    }

    /// Open a port named `port_name` and connect it from the `index`-th
    /// available source.
    pub fn open_port(&mut self, index: usize, port_name: &str) -> Result<()> {
        if !self.connect() {
            return Err(Error::Driver("driver not running".into()));
        }
        let port = self.register(port_name)?;

        let source = self.get_port_name(index);
        if source.is_empty() {
            // Port stays registered but unconnected, as with a stale index.
            return Ok(());
        }
        let own_name = self.driver.port_name(port)?;
        self.driver.connect_ports(&source, &own_name)?;
        debug!("MIDI input '{own_name}' connected from '{source}'");
        Ok(())
    }

    /// Open a port without connecting it to any source.
    pub fn open_virtual_port(&mut self, port_name: &str) -> Result<()> {
        if !self.connect() {
            return Err(Error::Driver("driver not running".into()));
        }
        self.register(port_name)?;
        Ok(())
    }

    /// Unregister the port and stop delivery. The inbound side holds no
    /// buffers the callback could race on, so no handshake is needed.
    pub fn close_port(&mut self) {
        let Some(port) = self.port.take() else {
            return;
        };
        self.shared.registered.store(false, Ordering::Release);
        if let Err(e) = self.driver.unregister_port(port) {
            warn!("failed to unregister MIDI input port: {e}");
        }
        let dropped = self.consumer.dropped_count();
        if dropped > 0 {
            warn!("MIDI input queue overflowed; {dropped} message(s) dropped");
        }
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Install a sink callback, invoked inline on the real-time thread for
    /// each message. Mutually exclusive with [`get_message`]: while a
    /// callback is installed, nothing reaches the queue.
    ///
    /// [`get_message`]: MidiInput::get_message
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn(MidiMessage) + Send + Sync + 'static,
    {
        self.shared
            .dispatch
            .store(Arc::new(Dispatch::Callback(Box::new(callback))));
    }

    /// Revert to queue dispatch.
    pub fn clear_callback(&self) {
        self.shared.dispatch.store(Arc::new(Dispatch::Queue));
    }

    /// Drain one message from the bounded queue, oldest first.
    pub fn get_message(&mut self) -> Option<MidiMessage> {
        self.consumer.pop()
    }

    /// Messages lost to queue overflow since construction.
    pub fn dropped_count(&self) -> u64 {
        self.consumer.dropped_count()
    }

    /// While set, SysEx continuation fragments are timestamped but not
    /// dispatched.
    pub fn set_sysex_continuation(&self, continuing: bool) {
        self.shared
            .continue_sysex
            .store(continuing, Ordering::Relaxed);
    }

    /// Number of sources this endpoint could connect from.
    pub fn get_port_count(&mut self) -> usize {
        if !self.connect() {
            return 0;
        }
        // Sources are the driver's output-capable ports.
        match self.driver.port_names(PortDirection::Output) {
            Ok(names) => names.len(),
            Err(e) => {
                warn!("MIDI port enumeration failed: {e}");
                0
            }
        }
    }

    /// Name of the `index`-th available source; empty (with a warning) on a
    /// stale index.
    pub fn get_port_name(&mut self, index: usize) -> String {
        if !self.connect() {
            return String::new();
        }
        let names = match self.driver.port_names(PortDirection::Output) {
            Ok(names) => names,
            Err(e) => {
                warn!("no MIDI source ports available: {e}");
                return String::new();
            }
        };
        match names.into_iter().nth(index) {
            Some(name) => name,
            None => {
                warn!("MIDI source port index {index} is invalid");
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
            warn!("MIDI input port rename failed: {e}");
        })
    }
}

impl Drop for MidiInput {
    fn drop(&mut self) {
        self.close_port();
    }
}

impl std::fmt::Debug for MidiInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiInput")
            .field("client_name", &self.client_name)
            .field("connected", &self.connected)
            .field("open", &self.port.is_some())
            .finish()
    }
}
