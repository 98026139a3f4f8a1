// Copyright (c) 2022-2023 The MobileCoin Foundation

//! USB HID transport using [hidapi]
//!
//! HID calls block, so these are executed on the tokio blocking pool.
//! Reads poll with a short timeout so [Transport::close] is observed promptly,
//! device access is granted in FIFO order so pending writes run between polls.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use hidapi::{HidApi, HidDevice};
use log::{debug, trace};

use hwlink_proto::{Framing, HID_PACKET_SIZE};

use super::{HidInfo, Transport};
use crate::{DeviceInfo, Error};

/// Known hardware wallet (vendor id, product id, name) combinations
pub const KNOWN_DEVICES: &[(u16, u16, &str)] = &[
    (0x534c, 0x0001, "Trezor One"),
    (0x2b24, 0x0001, "KeepKey"),
];

/// Read poll interval, bounds close latency
const READ_TIMEOUT_MS: i32 = 100;

/// Blocking device shared by the reader and writers
///
/// Callers take turns through a fair async lock, a write issued while a
/// read poll is in progress runs before the next poll starts.
pub(crate) struct BlockingDevice<D> {
    device: Arc<Mutex<D>>,
    turn: tokio::sync::Mutex<()>,
}

impl<D: Send + 'static> BlockingDevice<D> {
    pub fn new(device: D) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            turn: tokio::sync::Mutex::new(()),
        }
    }

    /// Run a blocking operation on the device once it is our turn
    pub async fn run<R, F>(&self, f: F) -> Result<R, Error>
    where
        R: Send + 'static,
        F: FnOnce(&D) -> Result<R, Error> + Send + 'static,
    {
        let _turn = self.turn.lock().await;

        let d = self.device.clone();
        tokio::task::spawn_blocking(move || {
            let dev = d.lock().map_err(|_| Error::Closed)?;
            f(&dev)
        })
        .await?
    }
}

/// USB HID device transport
pub struct HidTransport {
    device: BlockingDevice<HidDevice>,
    info: HidInfo,
    report_id: u8,
    closed: Arc<AtomicBool>,
}

impl HidTransport {
    /// List attached devices matching [KNOWN_DEVICES]
    pub fn list_devices(api: &HidApi) -> impl Iterator<Item = HidInfo> + '_ {
        api.device_list()
            .filter(|d| {
                KNOWN_DEVICES
                    .iter()
                    .any(|(v, p, _)| d.vendor_id() == *v && d.product_id() == *p)
            })
            .map(HidInfo::from)
    }

    /// Open the device described by `info`
    pub fn open_device(api: &HidApi, info: &HidInfo) -> Result<Self, Error> {
        debug!(
            "Opening HID device {:04x}:{:04x} ({:?})",
            info.vendor_id, info.product_id, info.path
        );

        let device = api.open_path(&info.path)?;

        Ok(Self {
            device: BlockingDevice::new(device),
            info: info.clone(),
            report_id: 0x00,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Override the report id prefixed to outgoing packets
    pub fn with_report_id(mut self, report_id: u8) -> Self {
        self.report_id = report_id;
        self
    }

    pub fn vendor_id(&self) -> u16 {
        self.info.vendor_id
    }

    pub fn product_id(&self) -> u16 {
        self.info.product_id
    }

    pub fn serial_number(&self) -> Option<&str> {
        self.info.serial_number.as_deref()
    }

    fn check_open(&self) -> Result<(), Error> {
        match self.closed.load(Ordering::Acquire) {
            true => Err(Error::Closed),
            false => Ok(()),
        }
    }
}

#[async_trait]
impl Transport for HidTransport {
    fn framing(&self) -> Framing {
        Framing::HID
    }

    async fn open(&self) -> Result<(), Error> {
        // Devices are opened on construction
        self.check_open()
    }

    async fn read(&self, buff: &mut [u8]) -> Result<usize, Error> {
        let len = buff.len().min(HID_PACKET_SIZE);

        loop {
            self.check_open()?;

            let packet = self
                .device
                .run(move |dev| {
                    let mut b = vec![0u8; len];
                    let n = dev.read_timeout(&mut b, READ_TIMEOUT_MS)?;
                    b.truncate(n);
                    Ok(b)
                })
                .await?;

            if !packet.is_empty() {
                trace!("HID rx: {}", hex::encode(&packet));

                buff[..packet.len()].copy_from_slice(&packet);
                return Ok(packet.len());
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        self.check_open()?;

        trace!("HID tx: {}", hex::encode(data));

        // Platform HID APIs expect a leading report id
        let mut b = Vec::with_capacity(data.len() + 1);
        b.push(self.report_id);
        b.extend_from_slice(data);

        self.device
            .run(move |dev| {
                dev.write(&b)?;
                Ok(())
            })
            .await?;

        Ok(data.len())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(
                "Closing HID device {:04x}:{:04x}",
                self.info.vendor_id, self.info.product_id
            );
        }
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Hid(self.info.clone())
    }
}
