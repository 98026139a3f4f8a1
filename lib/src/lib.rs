// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hardware wallet host library (and CLI)
//!
//! This provides [Transport]s for USB HID and TCP connected devices,
//! [Session]s decoding device frames into an ordered [Event] queue,
//! a [WalletHandle] tracking wallet state over a session, and a
//! [Relay][relay::Relay] bridge for sharing a device across a network.
//!

use std::fmt::Debug;

use async_trait::async_trait;

#[cfg(feature = "transport_hid")]
use hidapi::HidApi;

/// Re-export transports for consumer use
pub mod transport;
use transport::*;

/// Re-export `hwlink-proto` and `hwlink-core` for consumers
pub use hwlink_core::engine::{self, Event};
pub use hwlink_proto::{self as proto, Message, MessageType};

mod session;
pub use session::{Session, SessionId};

mod wallet;
pub use wallet::WalletHandle;

#[cfg(feature = "transport_tcp")]
pub mod relay;

mod error;
pub use error::Error;

/// Device provider manages device discovery and connections
pub struct DeviceProvider {
    #[cfg(feature = "transport_hid")]
    hid_api: HidApi,
}

/// Device discovery filter
#[derive(Copy, Clone, Debug, PartialEq, clap::ValueEnum, strum::Display)]
#[non_exhaustive]
pub enum Filter {
    /// List all devices available using supported transports
    Any,
    /// List only HID devices
    Hid,
    /// List only TCP relays
    Tcp,
}

/// Device information for listing, used by connect
#[derive(Clone, Debug, PartialEq)]
#[non_exhaustive]
pub enum DeviceInfo {
    Hid(HidInfo),
    Tcp(TcpOptions),
    /// Other transports (mocks, test devices)
    Other(String),
}

impl DeviceProvider {
    /// Create a new device provider
    /// NOTE: only one provider may exist at a time (workaround for global HID context errors on macos/m1)
    pub fn new() -> Result<Self, Error> {
        #[cfg(feature = "transport_hid")]
        return Ok(Self {
            hid_api: HidApi::new()?,
        });

        #[cfg(not(feature = "transport_hid"))]
        return Ok(Self {});
    }

    /// List available devices
    pub async fn list_devices(&self, filter: Filter) -> Vec<DeviceInfo> {
        let mut devices = vec![];

        #[cfg(feature = "transport_hid")]
        if filter == Filter::Any || filter == Filter::Hid {
            HidTransport::list_devices(&self.hid_api).for_each(|d| {
                devices.push(DeviceInfo::Hid(d));
            });
        }

        #[cfg(feature = "transport_tcp")]
        if filter == Filter::Any || filter == Filter::Tcp {
            // Try connecting to the default relay port
            let o = TcpOptions::default();
            if let Ok(_t) = tokio::net::TcpStream::connect(o.socket_addr()).await {
                devices.push(DeviceInfo::Tcp(o));
            };
        }

        log::debug!("Found {} devices: {:?}", devices.len(), devices);

        devices
    }

    /// Select a device by index from those matching the filter
    pub async fn select(&self, filter: Filter, index: usize) -> Result<DeviceInfo, Error> {
        let mut devices = self.list_devices(filter).await;

        match devices.len() {
            0 => Err(Error::NoDevice),
            n if index >= n => Err(Error::InvalidDeviceIndex(index, n - 1)),
            _ => Ok(devices.swap_remove(index)),
        }
    }
}

/// Generic session (abstract over transport types)
#[cfg(any(feature = "transport_hid", feature = "transport_tcp"))]
pub type GenericSession = Session<GenericTransport>;

impl std::fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceInfo::Hid(hid_info) => {
                write!(
                    f,
                    "{:16} (USB, {:04x}:{:04x}, {})",
                    hid_info.product.as_deref().unwrap_or("UNKNOWN"),
                    hid_info.vendor_id,
                    hid_info.product_id,
                    hid_info.serial_number.as_deref().unwrap_or("UNKNOWN"),
                )
            }
            DeviceInfo::Tcp(tcp_info) => {
                write!(f, "{:16} (TCP, {}:{})", "Relay", tcp_info.addr, tcp_info.port)
            }
            DeviceInfo::Other(name) => write!(f, "{:16} (other)", name),
        }
    }
}

/// Connect trait for supported transports
#[async_trait]
pub trait Connect<T: Transport> {
    type Options: Debug;

    /// Connect to the specified device
    async fn connect(&self, opts: &Self::Options) -> Result<Session<T>, Error>;
}

/// Generic connect implementation
#[cfg(any(feature = "transport_hid", feature = "transport_tcp"))]
#[async_trait]
impl Connect<GenericTransport> for DeviceProvider {
    type Options = DeviceInfo;

    async fn connect(&self, opts: &Self::Options) -> Result<Session<GenericTransport>, Error> {
        let t = match opts {
            #[cfg(feature = "transport_hid")]
            DeviceInfo::Hid(hid_info) => {
                // Connect to device
                let t = HidTransport::open_device(&self.hid_api, hid_info)?;

                GenericTransport::Hid(t)
            }
            #[cfg(feature = "transport_tcp")]
            DeviceInfo::Tcp(tcp_info) => GenericTransport::Tcp(TcpTransport::new(tcp_info.clone())),
            _ => return Err(Error::NoDevice),
        };

        Ok(Session::new(t).await)
    }
}

/// Connect implementation for HID devices
#[cfg(feature = "transport_hid")]
#[async_trait]
impl Connect<HidTransport> for DeviceProvider {
    type Options = HidInfo;

    async fn connect(&self, opts: &Self::Options) -> Result<Session<HidTransport>, Error> {
        let t = HidTransport::open_device(&self.hid_api, opts)?;

        Ok(Session::new(t).await)
    }
}

/// Connect implementation for TCP relays
#[cfg(feature = "transport_tcp")]
#[async_trait]
impl Connect<TcpTransport> for DeviceProvider {
    type Options = TcpOptions;

    async fn connect(&self, opts: &Self::Options) -> Result<Session<TcpTransport>, Error> {
        Ok(Session::new(TcpTransport::new(opts.clone())).await)
    }
}
