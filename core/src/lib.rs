// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Hardware wallet session core
//!
//! This provides the [Event][engine::Event] model shared by sessions and the
//! relay, and the wallet [Engine][engine::Engine] tracking the protocol-level
//! state of a connected device.
//!
//! The engine is purely reactive: each incoming event is looked up in a
//! [TransitionTable][engine::TransitionTable] keyed by the current
//! [WalletState][engine::WalletState] and the message type, the state is
//! updated and any [Listener][engine::Listener] callbacks fired before
//! [Engine::handle][engine::Engine::handle] returns an
//! [Output][engine::Output] to the caller.
//!
//! ## States
//!
//! A session starts `Wiped` until a `Features` report says otherwise,
//! moves through the `Awaiting*` states while the device requests user
//! input, and through `SigningTransaction` while a transaction is in
//! progress. `Failed` and `Disconnected` are terminal, a new session is
//! required to continue.
//!
//! Any message the table does not list for the current state leaves the
//! state unchanged and is logged, devices cannot crash a session by
//! sending unexpected input.

pub use hwlink_proto::{self as proto};

pub mod engine;
