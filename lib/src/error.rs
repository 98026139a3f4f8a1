// Copyright (c) 2022-2023 The MobileCoin Foundation

use tokio::time::error::Elapsed;

use hwlink_core::engine::Event;
use hwlink_proto::FrameError;

/// Hardware wallet API Error Type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport closed (explicitly or by the peer)
    #[error("Transport closed")]
    Closed,

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HID API error
    #[cfg(feature = "transport_hid")]
    #[error("HID error: {0}")]
    Hid(#[from] hidapi::HidError),

    /// Message framing error
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// Payload decoding error
    #[error("Payload decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    /// Request timeout
    #[error("Timeout waiting for device response")]
    Timeout,

    /// Relay rejected the request while serving another client
    #[error("Device busy")]
    RelayBusy,

    /// Device reported a failure
    #[error("Device failure (code: {0:?}): {1}")]
    Failure(Option<u32>, String),

    /// Unexpected response to a request
    #[error("Unexpected response: {0:?}")]
    UnexpectedResponse(Event),

    /// No device found
    #[error("No device found")]
    NoDevice,

    /// Invalid device index
    #[error("Invalid device index: {0} (max: {1})")]
    InvalidDeviceIndex(usize, usize),

    /// Background task failed
    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<Elapsed> for Error {
    fn from(_: Elapsed) -> Self {
        Error::Timeout
    }
}
