// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session binding a [Transport] to a frame codec and an ordered event queue
//!
//! Each session runs a single background reader which decodes frames from
//! the transport and pushes [Event]s onto the queue in arrival order. The
//! first event is always [SystemEvent::Connected], or a lone
//! [SystemEvent::ConnectFailed] where the transport could not be opened.
//! Transport failures push exactly one terminal event, after which the
//! queue drains and then reports `None`.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, trace, warn};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};

use hwlink_core::engine::{Event, SystemEvent};
use hwlink_proto::{FrameCodec, Message};

use crate::{transport::Transport, DeviceInfo, Error};

/// Opaque session identifier, used for log correlation
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Generate a new random session identifier
    pub fn random() -> Self {
        Self(rand::random())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Session over a [Transport]
///
/// Session methods take `&self` and are safe to call concurrently,
/// writes are serialised so frames are never interleaved on the wire.
pub struct Session<T: Transport> {
    id: SessionId,
    transport: Arc<T>,
    codec: FrameCodec,
    /// Held across encode + write
    write_lock: Mutex<()>,
    /// Event queue, consumers serialise through the mutex
    events: Mutex<mpsc::UnboundedReceiver<Event>>,
    open: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl<T: Transport> Session<T> {
    /// Open a session over the provided transport with the default codec
    pub async fn new(t: T) -> Self {
        let codec = FrameCodec::new(t.framing());
        Self::with_codec(t, codec).await
    }

    /// Open a session over the provided transport with a custom codec
    /// (for example to raise the maximum payload length)
    pub async fn with_codec(t: T, codec: FrameCodec) -> Self {
        let id = SessionId::random();
        let transport = Arc::new(t);
        let (tx, rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(false));

        debug!("{id} opening session ({})", transport.info());

        let reader = match transport.open().await {
            Ok(_) => {
                open.store(true, Ordering::Release);
                let _ = tx.send(Event::System(SystemEvent::Connected));

                Some(tokio::spawn(read_task(
                    id,
                    transport.clone(),
                    codec,
                    tx,
                    open.clone(),
                )))
            }
            Err(e) => {
                warn!("{id} failed to open transport: {e}");

                // Sender drops here, so the queue ends after this event
                let _ = tx.send(Event::System(SystemEvent::ConnectFailed));
                None
            }
        };

        Self {
            id,
            transport,
            codec,
            write_lock: Mutex::new(()),
            events: Mutex::new(rx),
            open,
            reader,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Check whether the session is still live
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Describe the underlying device
    pub fn info(&self) -> DeviceInfo {
        self.transport.info()
    }

    pub fn codec(&self) -> &FrameCodec {
        &self.codec
    }

    /// Encode and write a message, without waiting for a reply
    pub async fn send(&self, m: &Message) -> Result<(), Error> {
        if !self.is_open() {
            return Err(Error::Closed);
        }

        let packets = self.codec.encode(m)?;

        let _w = self.write_lock.lock().await;

        debug!("{} tx: {:?}", self.id, m);

        for p in &packets {
            self.transport.write(p).await?;
        }

        Ok(())
    }

    /// Send a message and wait for the next event.
    ///
    /// The event queue is held for the duration so concurrent pollers
    /// cannot take the reply. The deadline covers waiting for the queue,
    /// on timeout no event is consumed.
    pub async fn send_and_wait(&self, m: &Message, timeout: Duration) -> Result<Event, Error> {
        let exchange = async {
            let mut rx = self.events.lock().await;

            self.send(m).await?;

            rx.recv().await.ok_or(Error::Closed)
        };

        tokio::time::timeout(timeout, exchange).await?
    }

    /// Fetch the next event, waiting up to `timeout` (or indefinitely for `None`).
    ///
    /// Returns `None` on timeout, or once the session has ended and all
    /// buffered events have been drained.
    pub async fn poll_event(&self, timeout: Option<Duration>) -> Option<Event> {
        let recv = async { self.events.lock().await.recv().await };

        match timeout {
            Some(t) => tokio::time::timeout(t, recv).await.ok().flatten(),
            None => recv.await,
        }
    }

    /// Close the session, pending operations observe the closure promptly
    pub async fn close(&self) {
        if self.open.swap(false, Ordering::AcqRel) {
            debug!("{} closing session", self.id);
        }

        self.transport.close().await;
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if let Some(r) = self.reader.take() {
            r.abort();
        }
    }
}

/// Background reader, decodes frames until the transport fails
async fn read_task<T: Transport>(
    id: SessionId,
    t: Arc<T>,
    codec: FrameCodec,
    tx: mpsc::UnboundedSender<Event>,
    open: Arc<AtomicBool>,
) {
    let mut reader = codec.reader();
    let mut buff = vec![0u8; codec.framing().read_size()];

    let terminal = 'read: loop {
        let n = match t.read(&mut buff).await {
            Ok(n) => n,
            Err(e) => {
                debug!("{id} read failed: {e}");
                break SystemEvent::Disconnected;
            }
        };

        trace!("{id} rx {n} bytes");

        reader.push(&buff[..n]);

        while let Some(r) = reader.next() {
            let evt = match r {
                Ok(m) => Event::from_wire(m),
                Err(e) => {
                    warn!("{id} discarding malformed frame: {e}");
                    Event::System(SystemEvent::SchemeViolation)
                }
            };

            // Relayed terminal events end the session
            if let Event::System(s) = &evt {
                if s.is_terminal() {
                    break 'read *s;
                }
            }

            debug!("{id} rx: {:?}", evt);

            if tx.send(evt).is_err() {
                // Session dropped, nobody is listening
                return;
            }
        }
    };

    // Truncated frames are reported ahead of the terminal event
    if reader.in_progress() {
        warn!("{id} transport closed mid-frame");
        let _ = tx.send(Event::System(SystemEvent::SchemeViolation));
    }

    debug!("{id} session ended: {terminal}");

    open.store(false, Ordering::Release);
    t.close().await;

    let _ = tx.send(Event::System(terminal));
}
