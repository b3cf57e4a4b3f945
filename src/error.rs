//! Error types for the bridge.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The backend service is not running or refused the client connection.
    /// Non-fatal: the endpoint stays unconnected and a later call may retry.
    #[error("MIDI driver unavailable: {0}")]
    Driver(String),

    #[error("MIDI port error: {0}")]
    Port(String),

    /// The driver does not implement this operation (e.g. port renaming).
    #[error("operation not supported by this driver: {0}")]
    Unsupported(String),

    /// The outbound ring buffer has no room for this message right now.
    /// Nothing was written; the size and payload channels stay paired.
    #[error("output ring buffer full ({needed} bytes needed)")]
    RingFull { needed: usize },

    /// The message can never fit the ring buffer, regardless of drain state.
    #[error("message of {size} bytes exceeds ring capacity of {capacity} bytes")]
    MessageTooLarge { size: usize, capacity: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
