// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Ping tests, with and without on-device confirmation

use std::future::Future;

use log::info;

use hwlink::{transport::Transport, Session, WalletHandle};

/// Ping the device, then ping again requiring button confirmation
pub async fn test<T, F>(s: Session<T>, approve: impl Fn() -> F, text: &str) -> anyhow::Result<()>
where
    T: Transport,
    F: Future<Output = ()>,
{
    let mut w = WalletHandle::from(s);

    let r = w.ping(text, false).await?;
    info!("ping response: '{}'", r);
    anyhow::ensure!(r == text, "ping response mismatch");

    // Confirmation runs alongside the pending request
    let (r, _) = tokio::join!(w.ping(text, true), approve());
    let r = r?;

    info!("protected ping response: '{}'", r);
    anyhow::ensure!(r == text, "protected ping response mismatch");

    anyhow::ensure!(
        w.state().is_base(),
        "wallet left in state {} after ping",
        w.state()
    );

    w.close().await;

    Ok(())
}
