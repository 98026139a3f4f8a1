// Copyright (c) 2022-2023 The MobileCoin Foundation

//! TCP socket transport, used to reach relay bridges

use async_trait::async_trait;
use log::{debug, trace};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{watch, Mutex},
};

use hwlink_proto::Framing;

use super::{TcpOptions, Transport};
use crate::{DeviceInfo, Error};

/// TCP stream transport
pub struct TcpTransport {
    opts: TcpOptions,
    rx: Mutex<Option<OwnedReadHalf>>,
    tx: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
}

impl TcpTransport {
    /// Create a transport connecting to `opts` on [Transport::open]
    pub fn new(opts: TcpOptions) -> Self {
        Self {
            opts,
            rx: Mutex::new(None),
            tx: Mutex::new(None),
            closed: watch::channel(false).0,
        }
    }

    /// Wrap an already connected stream (as returned by accept)
    pub fn from_stream(stream: TcpStream) -> Result<Self, Error> {
        let opts = TcpOptions::from(stream.peer_addr()?);
        let (rx, tx) = stream.into_split();

        Ok(Self {
            opts,
            rx: Mutex::new(Some(rx)),
            tx: Mutex::new(Some(tx)),
            closed: watch::channel(false).0,
        })
    }

    pub fn options(&self) -> &TcpOptions {
        &self.opts
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn framing(&self) -> Framing {
        Framing::Stream
    }

    async fn open(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let mut tx = self.tx.lock().await;
        if tx.is_some() {
            return Ok(());
        }

        debug!("Connecting to {}", self.opts.socket_addr());

        let s = TcpStream::connect(self.opts.socket_addr()).await?;
        s.set_nodelay(true)?;

        let (r, w) = s.into_split();
        *self.rx.lock().await = Some(r);
        *tx = Some(w);

        Ok(())
    }

    async fn read(&self, buff: &mut [u8]) -> Result<usize, Error> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow() {
            return Err(Error::Closed);
        }

        let mut rx = self.rx.lock().await;
        let r = rx.as_mut().ok_or(Error::Closed)?;

        tokio::select! {
            n = r.read(buff) => match n? {
                // EOF, peer closed the socket
                0 => Err(Error::Closed),
                n => {
                    trace!("TCP rx {} bytes", n);
                    Ok(n)
                },
            },
            _ = closed.changed() => Err(Error::Closed),
        }
    }

    async fn write(&self, data: &[u8]) -> Result<usize, Error> {
        if self.is_closed() {
            return Err(Error::Closed);
        }

        let mut tx = self.tx.lock().await;
        let w = tx.as_mut().ok_or(Error::Closed)?;

        w.write_all(data).await?;

        trace!("TCP tx {} bytes", data.len());

        Ok(data.len())
    }

    async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        debug!("Closing TCP connection to {}", self.opts.socket_addr());

        if let Some(mut w) = self.tx.lock().await.take() {
            let _ = w.shutdown().await;
        }
    }

    fn info(&self) -> DeviceInfo {
        DeviceInfo::Tcp(self.opts.clone())
    }
}
