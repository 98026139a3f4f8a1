// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Tests for hardware wallet sessions.
//!
//! Scenarios are generic over [hwlink::transport::Transport] for reuse with
//! both the [MockTransport] and real devices.
//!

pub mod mock;
pub use mock::MockTransport;

pub mod features;

pub mod ping;

pub mod ordering;
