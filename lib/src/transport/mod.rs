// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Transport abstraction over USB HID devices and TCP sockets
//!

use std::{
    ffi::CString,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};

use async_trait::async_trait;
use strum::Display;

use hwlink_proto::Framing;

use crate::{DeviceInfo, Error};

#[cfg(feature = "transport_hid")]
mod hid;
#[cfg(feature = "transport_hid")]
pub use hid::{HidTransport, KNOWN_DEVICES};

#[cfg(feature = "transport_tcp")]
mod tcp;
#[cfg(feature = "transport_tcp")]
pub use tcp::TcpTransport;

/// Default TCP port for relay bridges
pub const DEFAULT_RELAY_PORT: u16 = 21325;

/// Bidirectional byte channel to a device or relay
///
/// Methods take `&self` so a session reader and writers may operate
/// concurrently, implementations are responsible for their own locking.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Chunking applied to frames on this transport
    fn framing(&self) -> Framing;

    /// Open the transport, calling this more than once is a no-op
    async fn open(&self) -> Result<(), Error>;

    /// Read a single packet or stream chunk, blocking until data is available.
    /// Returns [Error::Closed] once the transport has been closed.
    async fn read(&self, buff: &mut [u8]) -> Result<usize, Error>;

    /// Write a single packet or stream chunk
    async fn write(&self, data: &[u8]) -> Result<usize, Error>;

    /// Close the transport, pending and future reads and writes fail
    async fn close(&self);

    /// Describe the connected device
    fn info(&self) -> DeviceInfo;
}

/// USB HID device information for listing and selection
#[derive(Clone, PartialEq, Debug)]
pub struct HidInfo {
    /// Platform device path
    pub path: CString,
    pub vendor_id: u16,
    pub product_id: u16,
    pub serial_number: Option<String>,
    pub product: Option<String>,
}

#[cfg(feature = "transport_hid")]
impl From<&hidapi::DeviceInfo> for HidInfo {
    fn from(d: &hidapi::DeviceInfo) -> Self {
        Self {
            path: d.path().to_owned(),
            vendor_id: d.vendor_id(),
            product_id: d.product_id(),
            serial_number: d.serial_number().map(String::from),
            product: d.product_string().map(String::from),
        }
    }
}

/// TCP connection options
#[derive(Clone, PartialEq, Debug, clap::Args)]
pub struct TcpOptions {
    /// Relay address
    #[clap(long = "tcp-addr", default_value_t = Ipv4Addr::LOCALHOST.into(), env = "HWLINK_TCP_ADDR")]
    pub addr: IpAddr,

    /// Relay port
    #[clap(long = "tcp-port", default_value_t = DEFAULT_RELAY_PORT, env = "HWLINK_TCP_PORT")]
    pub port: u16,
}

impl TcpOptions {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.addr, self.port)
    }
}

impl Default for TcpOptions {
    fn default() -> Self {
        Self {
            addr: Ipv4Addr::LOCALHOST.into(),
            port: DEFAULT_RELAY_PORT,
        }
    }
}

impl From<SocketAddr> for TcpOptions {
    fn from(a: SocketAddr) -> Self {
        Self {
            addr: a.ip(),
            port: a.port(),
        }
    }
}

/// Generic transport (abstract over transport types)
#[cfg(any(feature = "transport_hid", feature = "transport_tcp"))]
#[derive(Display)]
#[non_exhaustive]
pub enum GenericTransport {
    #[cfg(feature = "transport_hid")]
    Hid(HidTransport),
    #[cfg(feature = "transport_tcp")]
    Tcp(TcpTransport),
}

/// Convert a HID transport into a generic transport
#[cfg(feature = "transport_hid")]
impl From<HidTransport> for GenericTransport {
    fn from(t: HidTransport) -> Self {
        Self::Hid(t)
    }
}

/// Convert a TCP transport into a generic transport
#[cfg(feature = "transport_tcp")]
impl From<TcpTransport> for GenericTransport {
    fn from(t: TcpTransport) -> Self {
        Self::Tcp(t)
    }
}

/// Implementation of [Transport] for [GenericTransport], dispatching to the inner transport
#[cfg(any(feature = "transport_hid", feature = "transport_tcp"))]
#[async_trait]
impl Transport for GenericTransport {
    fn framing(&self) -> Framing {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.framing(),
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.framing(),
        }
    }

    async fn open(&self) -> Result<(), Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.open().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.open().await,
        }
    }

    async fn read(&self, buff: &mut [u8]) -> Result<usize, Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.read(buff).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.read(buff).await,
        }
    }

    async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.write(data).await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.write(data).await,
        }
    }

    async fn close(&self) {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.close().await,
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.close().await,
        }
    }

    fn info(&self) -> DeviceInfo {
        match self {
            #[cfg(feature = "transport_hid")]
            Self::Hid(t) => t.info(),
            #[cfg(feature = "transport_tcp")]
            Self::Tcp(t) => t.info(),
        }
    }
}
