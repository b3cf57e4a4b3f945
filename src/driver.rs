//! Driver collaborator interface.
//!
//! Everything the bridge needs from the backend -- client connection, port
//! registration, enumeration, and per-cycle buffer access -- expressed as
//! traits so the bridge itself stays backend-agnostic. The driver owns the
//! per-cycle buffers; the bridge may only touch them for the duration of one
//! handler invocation.

use crate::error::Result;

/// Opaque driver-side port handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// One raw event inside a cycle's input buffer. Borrowed from the driver;
/// must not be retained past the handler return.
#[derive(Debug, Clone, Copy)]
pub struct RawEvent<'a> {
    pub bytes: &'a [u8],
    pub frame_offset: u32,
}

/// A cycle's inbound event buffer, in arrival order.
pub trait InputCycle {
    fn event_count(&self) -> usize;
    fn event(&self, index: usize) -> Option<RawEvent<'_>>;
}

/// A cycle's outbound hardware buffer.
pub trait OutputCycle {
    /// Drop anything stale from a previous cycle.
    fn clear(&mut self);

    /// Reserve `size` writable bytes at `frame_offset` within the cycle.
    /// `None` when the hardware buffer has no room left.
    fn reserve(&mut self, frame_offset: u32, size: usize) -> Option<&mut [u8]>;
}

/// Per-cycle handler installed at client connection time, before any port
/// exists. Handlers run on the driver's real-time thread and must not block;
/// all captured state lives in one explicitly owned `Arc`.
pub enum ProcessHandler {
    Input(Box<dyn FnMut(u32, &dyn InputCycle) + Send>),
    Output(Box<dyn FnMut(u32, &mut dyn OutputCycle) + Send>),
}

/// Backend surface consumed by the bridge. Implementations wrap a concrete
/// driver (JACK-style callback schedulers, in-process fakes for tests).
pub trait MidiDriver: Send + Sync {
    /// Establish the client connection and install the per-cycle handler.
    /// Idempotent per endpoint; `Error::Driver` when the backend is not
    /// running, in which case a later call may retry.
    fn connect_client(&self, client_name: &str, handler: ProcessHandler) -> Result<()>;

    fn register_port(&self, direction: PortDirection, name: &str) -> Result<PortId>;

    fn unregister_port(&self, port: PortId) -> Result<()>;

    /// Connect two ports by their driver-level names.
    fn connect_ports(&self, source: &str, destination: &str) -> Result<()>;

    /// Names of all ports with the given direction, in stable order.
    fn port_names(&self, direction: PortDirection) -> Result<Vec<String>>;

    /// Driver-level name of a registered port.
    fn port_name(&self, port: PortId) -> Result<String>;

    /// Rename a registered port. Drivers without rename support return
    /// `Error::Unsupported`.
    fn rename_port(&self, port: PortId, name: &str) -> Result<()>;
}
