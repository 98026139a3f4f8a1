// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Handle for connected wallets
//!
//! This drives a wallet [Engine] from [Session] events and provides
//! request / response helpers, generic over [Transport] types.

use std::time::Duration;

use log::debug;
use tokio::time::Instant;

use hwlink_core::engine::{Engine, Event, Listener, Output, SystemEvent, WalletState};
use hwlink_proto::{
    messages::{Failure, Features, GetFeatures, Initialize, Ping, Success},
    Message, MessageType,
};

use crate::{transport::Transport, Error, Session};

/// Wallet handle for a connected device [Session]
pub struct WalletHandle<T: Transport, L: Listener = ()> {
    session: Session<T>,
    engine: Engine<L>,
    /// Timeout for device responses
    request_timeout: Duration,
    /// Timeout for user acknowledgements
    user_timeout: Duration,
}

/// Create a [WalletHandle] with the default engine from a [Session]
impl<T: Transport> From<Session<T>> for WalletHandle<T> {
    fn from(session: Session<T>) -> Self {
        Self::with_engine(session, Engine::new())
    }
}

impl<T: Transport, L: Listener> WalletHandle<T, L> {
    /// Create a handle with a custom [Engine] (for listeners or rule changes)
    pub fn with_engine(session: Session<T>, engine: Engine<L>) -> Self {
        Self {
            session,
            engine,
            request_timeout: Duration::from_secs(2),
            user_timeout: Duration::from_secs(30),
        }
    }

    /// Set timeouts for device responses and user interaction
    pub fn with_timeouts(mut self, request: Duration, user: Duration) -> Self {
        self.request_timeout = request;
        self.user_timeout = user;
        self
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn engine(&self) -> &Engine<L> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine<L> {
        &mut self.engine
    }

    /// Fetch the current wallet state
    pub fn state(&self) -> WalletState {
        self.engine.state()
    }

    /// Poll a single event and drive the engine, sending any automatic reply.
    ///
    /// Returns `Ok(None)` on timeout and [Error::Closed] once the session
    /// has ended and all events have been consumed.
    pub async fn next(&mut self, timeout: Option<Duration>) -> Result<Option<(Event, Output)>, Error> {
        let evt = match self.session.poll_event(timeout).await {
            Some(e) => e,
            None if self.session.is_open() => return Ok(None),
            None => return Err(Error::Closed),
        };

        let o = self.engine.handle(&evt);

        if let Some(r) = &o.reply {
            debug!("{} auto reply: {:?}", self.session.id(), r);
            self.session.send(r).await?;
        }

        Ok(Some((evt, o)))
    }

    /// Send a request and wait for the device response,
    /// acknowledging button requests along the way
    pub async fn request(&mut self, m: &Message) -> Result<Message, Error> {
        self.session.send(m).await?;

        let mut deadline = Instant::now() + self.request_timeout;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout);
            }

            let (evt, o) = match self.next(Some(remaining)).await? {
                Some(v) => v,
                None => return Err(Error::Timeout),
            };

            let resp = match evt {
                Event::Protocol(r) => r,
                Event::System(SystemEvent::DeviceBusy) => return Err(Error::RelayBusy),
                Event::System(s) if s.is_terminal() => return Err(Error::Closed),
                Event::System(_) => continue,
            };

            // Automatic replies mean the device is waiting on the user
            if o.reply.is_some() {
                debug!("Waiting for user confirmation");
                deadline = Instant::now() + self.user_timeout;
                continue;
            }

            if resp.is(MessageType::Failure) {
                let f: Failure = resp.decode_proto()?;
                return Err(Error::Failure(f.code, f.message.unwrap_or_default()));
            }

            return Ok(resp);
        }
    }

    /// Reset the device session and fetch [Features]
    pub async fn initialize(&mut self) -> Result<Features, Error> {
        let req = Message::encode_proto(MessageType::Initialize, &Initialize {});
        let resp = self.request(&req).await?;

        Self::expect_features(resp)
    }

    /// Fetch [Features] without resetting the device session
    pub async fn features(&mut self) -> Result<Features, Error> {
        let req = Message::encode_proto(MessageType::GetFeatures, &GetFeatures {});
        let resp = self.request(&req).await?;

        Self::expect_features(resp)
    }

    /// Ping the device, returning the echoed text
    pub async fn ping(&mut self, text: &str, button_protection: bool) -> Result<String, Error> {
        let req = Message::encode_proto(
            MessageType::Ping,
            &Ping {
                message: Some(text.to_string()),
                button_protection: Some(button_protection),
            },
        );

        let resp = self.request(&req).await?;
        if !resp.is(MessageType::Success) {
            return Err(Error::UnexpectedResponse(Event::Protocol(resp)));
        }

        let s: Success = resp.decode_proto()?;
        Ok(s.message.unwrap_or_default())
    }

    /// Close the underlying session
    pub async fn close(&self) {
        self.session.close().await
    }

    fn expect_features(resp: Message) -> Result<Features, Error> {
        match resp.is(MessageType::Features) {
            true => Ok(resp.decode_proto()?),
            false => Err(Error::UnexpectedResponse(Event::Protocol(resp))),
        }
    }
}
