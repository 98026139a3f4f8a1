// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Mock [Transport] for exercising sessions, wallets and relays without hardware
//!
//! Inbound data is injected by the test, outbound writes are recorded and
//! decoded, and an optional responder emulates a device by replying to each
//! decoded request. Concurrent or interleaved writes are counted as
//! violations.

use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::{mpsc, watch};

use hwlink::{transport::Transport, DeviceInfo, Error};
use hwlink_proto::{
    messages::{ButtonRequest, ButtonRequestType, Failure, Features, Ping, Success},
    FrameCodec, FrameReader, Framing, Message, MessageType,
};

/// Device emulation callback, returns replies for a decoded request
pub type Responder = Box<dyn FnMut(&Message) -> Vec<Message> + Send>;

/// Mock transport, clones share the same underlying channel
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Inner>,
}

struct Inner {
    codec: FrameCodec,
    inbound: mpsc::UnboundedSender<Vec<u8>>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    writes: Mutex<Vec<Vec<u8>>>,
    received: Mutex<Vec<Message>>,
    decoder: Mutex<FrameReader>,
    responder: Mutex<Option<Responder>>,
    in_write: AtomicBool,
    violations: AtomicUsize,
    opens: AtomicUsize,
    fail_open: AtomicBool,
    closed: watch::Sender<bool>,
}

/// Lock ignoring poisoning, a panicking test already failed
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockTransport {
    /// Create a mock transport with the provided framing
    pub fn new(framing: Framing) -> Self {
        let codec = FrameCodec::new(framing);
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            inner: Arc::new(Inner {
                codec,
                inbound: tx,
                rx: tokio::sync::Mutex::new(rx),
                writes: Mutex::new(vec![]),
                received: Mutex::new(vec![]),
                decoder: Mutex::new(codec.reader()),
                responder: Mutex::new(None),
                in_write: AtomicBool::new(false),
                violations: AtomicUsize::new(0),
                opens: AtomicUsize::new(0),
                fail_open: AtomicBool::new(false),
                closed: watch::channel(false).0,
            }),
        }
    }

    /// Mock USB HID transport (64 byte packets)
    pub fn hid() -> Self {
        Self::new(Framing::HID)
    }

    /// Mock socket transport
    pub fn stream() -> Self {
        Self::new(Framing::Stream)
    }

    /// Mock wallet device, see [wallet_responder]
    pub fn wallet(framing: Framing, initialized: bool) -> Self {
        let t = Self::new(framing);
        t.set_responder(wallet_responder(initialized));
        t
    }

    /// Set the device emulation callback
    pub fn set_responder(&self, r: Responder) {
        *lock(&self.inner.responder) = Some(r);
    }

    /// Echo every request back to the host unmodified
    pub fn set_echo(&self) {
        self.set_responder(Box::new(|m: &Message| vec![m.clone()]))
    }

    /// Fail subsequent calls to [Transport::open]
    pub fn set_fail_open(&self, fail: bool) {
        self.inner.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Inject a message to be read by the host
    pub fn inject(&self, m: &Message) {
        match self.inner.codec.encode(m) {
            Ok(chunks) => chunks.iter().for_each(|c| self.inject_raw(c)),
            Err(e) => warn!("mock failed to encode {m:?}: {e}"),
        }
    }

    /// Inject raw bytes, split into transport sized reads
    pub fn inject_raw(&self, data: &[u8]) {
        for c in data.chunks(self.inner.codec.framing().read_size()) {
            let _ = self.inner.inbound.send(c.to_vec());
        }
    }

    /// Simulate device removal
    pub fn disconnect(&self) {
        debug!("mock disconnect");
        self.inner.closed.send_replace(true);
    }

    /// Raw chunks written by the host
    pub fn writes(&self) -> Vec<Vec<u8>> {
        lock(&self.inner.writes).clone()
    }

    /// Messages decoded from host writes
    pub fn received(&self) -> Vec<Message> {
        lock(&self.inner.received).clone()
    }

    /// Count of concurrent writes or undecodable frames
    pub fn violations(&self) -> usize {
        self.inner.violations.load(Ordering::SeqCst)
    }

    /// Count of successful opens
    pub fn opens(&self) -> usize {
        self.inner.opens.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        *self.inner.closed.borrow()
    }

    /// Decode a host write and run the responder
    fn respond(&self, data: &[u8]) {
        let mut decoded = vec![];
        {
            let mut d = lock(&self.inner.decoder);
            d.push(data);

            while let Some(r) = d.next() {
                match r {
                    Ok(m) => decoded.push(m),
                    Err(e) => {
                        warn!("mock received malformed frame: {e}");
                        self.inner.violations.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }

        for m in decoded {
            lock(&self.inner.received).push(m.clone());

            let replies = match lock(&self.inner.responder).as_mut() {
                Some(r) => r(&m),
                None => vec![],
            };

            for r in &replies {
                self.inject(r);
            }
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn framing(&self) -> Framing {
        self.inner.codec.framing()
    }

    async fn open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if self.inner.fail_open.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mock open failure",
            )));
        }

        self.inner.opens.fetch_add(1, Ordering::SeqCst);

        Ok(())
    }

    async fn read(&self, buff: &mut [u8]) -> Result<usize, Error> {
        let mut closed = self.inner.closed.subscribe();
        if *closed.borrow() {
            return Err(Error::Closed);
        }

        let mut rx = self.inner.rx.lock().await;

        tokio::select! {
            c = rx.recv() => match c {
                Some(c) => {
                    let n = c.len().min(buff.len());
                    buff[..n].copy_from_slice(&c[..n]);
                    Ok(n)
                },
                None => Err(Error::Closed),
            },
            _ = closed.changed() => Err(Error::Closed),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if self.inner.in_write.swap(true, Ordering::SeqCst) {
            warn!("mock detected concurrent write");
            self.inner.violations.fetch_add(1, Ordering::SeqCst);
        }

        lock(&self.inner.writes).push(data.to_vec());

        // Give concurrent writers a chance to interleave
        tokio::task::yield_now().await;

        self.inner.in_write.store(false, Ordering::SeqCst);

        self.respond(data);

        Ok(data.len())
    }

    async fn close(&self) {
        self.inner.closed.send_replace(true);
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Other("mock".to_string())
    }
}

/// Build a responder emulating a wallet device.
///
/// Answers `Initialize` / `GetFeatures` with [Features], `Ping` with
/// [Success] (via a [ButtonRequest] when button protection is requested),
/// `Cancel` with a cancellation [Failure] and anything else with an
/// unexpected message [Failure].
pub fn wallet_responder(initialized: bool) -> Responder {
    let mut pending: Option<String> = None;

    Box::new(move |m: &Message| {
        let t = match m.message_type() {
            Some(t) => t,
            None => return vec![failure(1, "Unexpected message")],
        };

        match t {
            MessageType::Initialize | MessageType::GetFeatures => {
                pending = None;

                let f = Features {
                    vendor: Some("hwlink".to_string()),
                    major_version: Some(1),
                    minor_version: Some(0),
                    patch_version: Some(0),
                    device_id: Some("MOCK0001".to_string()),
                    label: Some("mock".to_string()),
                    initialized: Some(initialized),
                    ..Default::default()
                };
                vec![Message::encode_proto(MessageType::Features, &f)]
            }
            MessageType::Ping => {
                let p: Ping = m.decode_proto().unwrap_or_default();
                let text = p.message.unwrap_or_default();

                match p.button_protection {
                    Some(true) => {
                        pending = Some(text);
                        let b = ButtonRequest {
                            code: Some(ButtonRequestType::ProtectCall as u32),
                            data: None,
                        };
                        vec![Message::encode_proto(MessageType::ButtonRequest, &b)]
                    }
                    _ => vec![success(text)],
                }
            }
            MessageType::ButtonAck => match pending.take() {
                Some(text) => vec![success(text)],
                None => vec![failure(1, "Unexpected message")],
            },
            MessageType::Cancel => {
                pending = None;
                vec![failure(4, "Action cancelled")]
            }
            _ => vec![failure(1, "Unexpected message")],
        }
    })
}

fn success(text: String) -> Message {
    Message::encode_proto(
        MessageType::Success,
        &Success {
            message: Some(text),
        },
    )
}

fn failure(code: u32, text: &str) -> Message {
    Message::encode_proto(
        MessageType::Failure,
        &Failure {
            code: Some(code),
            message: Some(text.to_string()),
        },
    )
}
