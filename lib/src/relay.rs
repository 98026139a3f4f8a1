// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Relay bridge, exposing a single device [Session] to TCP clients
//!
//! Frames are relayed without interpretation. Device access is serialised
//! through a FIFO slot: a client request takes the slot, is written to the
//! device, and the slot is released once the next device message has been
//! forwarded to that client (or the client leaves). Unanswered requests
//! release the slot after the exchange timeout, and the owner is sent a
//! `DeviceBusy` control frame. Device disconnection is broadcast to every
//! client as a relay control frame.

use std::{
    collections::HashMap,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use log::{debug, info, warn};
use serde::Deserialize;
use tokio::{
    net::{TcpListener, TcpStream},
    sync::{Mutex, OwnedMutexGuard},
};

use hwlink_core::engine::{Event, SystemEvent};
use hwlink_proto::Message;

use crate::{
    transport::{TcpTransport, Transport, DEFAULT_RELAY_PORT},
    Error, Session,
};

/// Relay configuration
#[derive(Clone, PartialEq, Debug, clap::Args, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address to bind the relay listener
    #[clap(long, default_value_t = Ipv4Addr::LOCALHOST.into(), env = "HWLINK_RELAY_BIND")]
    pub bind: IpAddr,

    /// Port to bind the relay listener
    #[clap(long, default_value_t = DEFAULT_RELAY_PORT, env = "HWLINK_RELAY_PORT")]
    pub port: u16,

    /// Maximum number of requests waiting on the device before clients are rejected
    #[clap(long, default_value_t = 16)]
    pub max_queued_requests: usize,

    /// Disconnect clients idle for this many seconds
    #[clap(long, default_value_t = 300)]
    pub client_idle_timeout: u64,

    /// Release the device if a request is unanswered for this many seconds
    #[clap(long, default_value_t = 60)]
    pub exchange_timeout: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind: Ipv4Addr::LOCALHOST.into(),
            port: DEFAULT_RELAY_PORT,
            max_queued_requests: 16,
            client_idle_timeout: 300,
            exchange_timeout: 60,
        }
    }
}

impl RelayConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.client_idle_timeout)
    }

    pub fn exchange_timeout(&self) -> Duration {
        Duration::from_secs(self.exchange_timeout)
    }
}

type ClientId = u64;

type ClientSession = Session<TcpTransport>;

/// State shared between the dispatcher and client tasks
#[derive(Default)]
struct Shared {
    /// Device exchange slot, tokio mutexes are fair (FIFO)
    slot: Arc<Mutex<()>>,
    /// In-flight exchange
    owner: Mutex<Option<Exchange>>,
    clients: Mutex<HashMap<ClientId, Arc<ClientSession>>>,
    /// Requests waiting on the slot
    waiting: AtomicUsize,
    next_id: AtomicU64,
    next_exchange: AtomicU64,
}

/// Device slot held by a client until its reply is forwarded
struct Exchange {
    client: ClientId,
    seq: u64,
    _slot: OwnedMutexGuard<()>,
}

impl Shared {
    async fn is_owner(&self, id: ClientId) -> bool {
        matches!(&*self.owner.lock().await, Some(x) if x.client == id)
    }

    /// Release the device slot if owned by `id`
    async fn release(&self, id: ClientId) {
        let mut owner = self.owner.lock().await;
        if matches!(&*owner, Some(x) if x.client == id) {
            debug!("client {id} releasing device");
            *owner = None;
        }
    }
}

/// Relay bridge for a device [Session]
pub struct Relay<D: Transport> {
    config: RelayConfig,
    device: Arc<Session<D>>,
    shared: Arc<Shared>,
}

impl<D: Transport> Clone for Relay<D> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            device: self.device.clone(),
            shared: self.shared.clone(),
        }
    }
}

/// Relay with a bound listener, see [BoundRelay::run]
pub struct BoundRelay<D: Transport> {
    relay: Relay<D>,
    listener: TcpListener,
}

impl<D: Transport> Relay<D> {
    /// Create a new relay for the provided device session
    pub fn new(config: RelayConfig, device: Arc<Session<D>>) -> Self {
        Self {
            config,
            device,
            shared: Arc::new(Shared::default()),
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Bind the relay listener
    pub async fn bind(&self) -> Result<BoundRelay<D>, Error> {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;

        info!("Relay listening on {}", listener.local_addr()?);

        Ok(BoundRelay {
            relay: self.clone(),
            listener,
        })
    }

    /// Fetch the number of connected clients
    pub async fn clients(&self) -> usize {
        self.shared.clients.lock().await.len()
    }

    /// Forward device events to exchange owners until the device session ends
    async fn dispatch(self) {
        let terminal = loop {
            match self.device.poll_event(None).await {
                Some(Event::Protocol(m)) => self.forward(m).await,
                Some(Event::System(s)) if s.is_terminal() => break s,
                Some(Event::System(s)) => debug!("device event: {s}"),
                None => break SystemEvent::Disconnected,
            }
        };

        warn!("Device session ended ({terminal}), disconnecting clients");

        let clients: Vec<_> = self.shared.clients.lock().await.drain().collect();
        for (id, c) in clients {
            if let Err(e) = c.send(&terminal.to_message()).await {
                debug!("failed to notify client {id}: {e}");
            }
            c.close().await;
        }

        // Wake any waiting clients so they observe the closed device
        self.shared.owner.lock().await.take();
    }

    /// Forward a device message to the client owning the exchange
    async fn forward(&self, m: Message) {
        let x = match self.shared.owner.lock().await.take() {
            Some(x) => x,
            None => {
                warn!("Dropping unsolicited device message: {m:?}");
                return;
            }
        };

        let id = x.client;
        let client = self.shared.clients.lock().await.get(&id).cloned();
        match client {
            Some(c) => {
                debug!("device -> client {id}: {m:?}");
                if let Err(e) = c.send(&m).await {
                    debug!("failed to forward to client {id}: {e}");
                }
            }
            None => debug!("client {id} gone, dropping {m:?}"),
        }

        // Release only once the reply is on its way
        drop(x);
    }

    /// Register an accepted connection and start serving it
    async fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        let t = match TcpTransport::from_stream(stream) {
            Ok(t) => t,
            Err(e) => {
                warn!("Failed to setup client {addr}: {e}");
                return;
            }
        };

        let session = Arc::new(Session::new(t).await);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        info!("Client {id} connected from {addr} (session {})", session.id());

        // Late clients of a dead device are told immediately
        if !self.device.is_open() {
            let _ = session.send(&SystemEvent::Disconnected.to_message()).await;
            session.close().await;
            return;
        }

        self.shared.clients.lock().await.insert(id, session.clone());

        tokio::spawn(self.clone().serve(id, session));
    }

    /// Pump client requests to the device
    async fn serve(self, id: ClientId, client: Arc<ClientSession>) {
        let idle = self.config.idle_timeout();

        loop {
            let evt = match client.poll_event(Some(idle)).await {
                Some(e) => e,
                None if !client.is_open() => break,
                None => {
                    // Idle timeout only applies between exchanges
                    if self.shared.is_owner(id).await {
                        continue;
                    }
                    info!("Client {id} idle, disconnecting");
                    break;
                }
            };

            match evt {
                Event::Protocol(m) => {
                    if let Err(e) = self.exchange(id, &client, m).await {
                        warn!("Client {id} exchange failed: {e}");
                        break;
                    }
                }
                Event::System(s) if s.is_terminal() => break,
                Event::System(s) => debug!("client {id} event: {s}"),
            }
        }

        self.shared.clients.lock().await.remove(&id);
        self.shared.release(id).await;
        client.close().await;

        info!("Client {id} disconnected");
    }

    /// Write a client request to the device once the slot is available
    async fn exchange(&self, id: ClientId, client: &ClientSession, m: Message) -> Result<(), Error> {
        let slot = match self.shared.slot.clone().try_lock_owned() {
            Ok(s) => s,
            Err(_) => {
                let queued = self.shared.waiting.fetch_add(1, Ordering::SeqCst);
                if queued >= self.config.max_queued_requests {
                    self.shared.waiting.fetch_sub(1, Ordering::SeqCst);

                    warn!("Client {id} rejected, {queued} requests queued");
                    return client.send(&SystemEvent::DeviceBusy.to_message()).await;
                }

                // Waiting is bounded by the idle timeout
                let r = tokio::time::timeout(
                    self.config.idle_timeout(),
                    self.shared.slot.clone().lock_owned(),
                )
                .await;
                self.shared.waiting.fetch_sub(1, Ordering::SeqCst);

                match r {
                    Ok(s) => s,
                    Err(_) => {
                        warn!("Client {id} timed out waiting for the device");
                        return client.send(&SystemEvent::DeviceBusy.to_message()).await;
                    }
                }
            }
        };

        // Requests from clients that left while queued are dropped
        if !client.is_open() {
            debug!("client {id} gone, dropping {m:?}");
            return Err(Error::Closed);
        }

        if !self.device.is_open() {
            drop(slot);
            let _ = client.send(&SystemEvent::Disconnected.to_message()).await;
            return Err(Error::Closed);
        }

        let seq = self.shared.next_exchange.fetch_add(1, Ordering::Relaxed);
        *self.shared.owner.lock().await = Some(Exchange {
            client: id,
            seq,
            _slot: slot,
        });

        debug!("client {id} -> device: {m:?}");

        if let Err(e) = self.device.send(&m).await {
            self.shared.release(id).await;
            return Err(e);
        }

        tokio::spawn(self.clone().expire(id, seq));

        Ok(())
    }

    /// Release an exchange the device has not answered in time
    async fn expire(self, id: ClientId, seq: u64) {
        tokio::time::sleep(self.config.exchange_timeout()).await;

        {
            let mut owner = self.shared.owner.lock().await;
            if !matches!(&*owner, Some(x) if x.seq == seq) {
                return;
            }
            *owner = None;
        }

        warn!("Client {id} request unanswered, releasing device");

        let client = self.shared.clients.lock().await.get(&id).cloned();
        if let Some(c) = client {
            let _ = c.send(&SystemEvent::DeviceBusy.to_message()).await;
        }
    }
}

impl<D: Transport> BoundRelay<D> {
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Fetch a handle to the relay, for client counts while running
    pub fn relay(&self) -> &Relay<D> {
        &self.relay
    }

    /// Accept and serve clients until the device session ends
    pub async fn run(self) -> Result<(), Error> {
        let BoundRelay { relay, listener } = self;

        let mut dispatcher = tokio::spawn(relay.clone().dispatch());

        loop {
            tokio::select! {
                r = listener.accept() => match r {
                    Ok((stream, addr)) => relay.accept(stream, addr).await,
                    Err(e) => warn!("Accept failed: {e}"),
                },
                r = &mut dispatcher => {
                    r?;
                    break;
                }
            }
        }

        info!("Relay stopped");

        Ok(())
    }
}
