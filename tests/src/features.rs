// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Device initialisation tests

use log::info;

use hwlink::{engine::WalletState, transport::Transport, Session, WalletHandle};
use hwlink_proto::messages::Features;

/// Initialise the device and check the wallet state follows the reported features
pub async fn test<T: Transport>(s: Session<T>) -> anyhow::Result<Features> {
    let mut w = WalletHandle::from(s);

    let f = w.initialize().await?;

    info!(
        "device: {} ({}), firmware: {}, initialized: {:?}",
        f.label.as_deref().unwrap_or("UNKNOWN"),
        f.device_id.as_deref().unwrap_or("UNKNOWN"),
        f.version(),
        f.initialized
    );

    let expected = match f.initialized {
        Some(true) => WalletState::Initialised,
        _ => WalletState::Wiped,
    };
    anyhow::ensure!(
        w.state() == expected,
        "unexpected wallet state {} (expected {})",
        w.state(),
        expected
    );

    // Feature requests must not reset the tracked state
    let g = w.features().await?;
    anyhow::ensure!(g.initialized == f.initialized, "features mismatch");
    anyhow::ensure!(w.state() == expected, "state changed on features");

    w.close().await;

    Ok(f)
}
