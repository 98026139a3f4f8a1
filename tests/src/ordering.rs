// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Event ordering tests

use std::time::Duration;

use log::{debug, info};

use hwlink::{
    engine::{Event, SystemEvent},
    transport::Transport,
    Message, MessageType, Session,
};
use hwlink_proto::messages::{Ping, Success};

/// Issue `n` pings back to back and check responses arrive in order
pub async fn test<T: Transport>(s: Session<T>, n: usize) -> anyhow::Result<()> {
    let timeout = Some(Duration::from_secs(5));

    match s.poll_event(timeout).await {
        Some(Event::System(SystemEvent::Connected)) => (),
        e => anyhow::bail!("expected connected event, received {:?}", e),
    }

    for i in 0..n {
        let p = Ping {
            message: Some(format!("ping {i}")),
            button_protection: None,
        };
        s.send(&Message::encode_proto(MessageType::Ping, &p)).await?;
    }

    for i in 0..n {
        let m = match s.poll_event(timeout).await {
            Some(Event::Protocol(m)) if m.is(MessageType::Success) => m,
            e => anyhow::bail!("expected success {i}, received {:?}", e),
        };

        let r: Success = m.decode_proto()?;
        debug!("response {i}: {:?}", r.message);

        anyhow::ensure!(
            r.message.as_deref() == Some(format!("ping {i}").as_str()),
            "response {i} out of order: {:?}",
            r.message
        );
    }

    info!("received {n} responses in order");

    s.close().await;

    Ok(())
}
