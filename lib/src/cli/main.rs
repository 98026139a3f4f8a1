// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Command line utility for interacting with hardware wallets

use std::time::Duration;

use clap::Parser;
use log::{debug, error, info, warn, LevelFilter};

use hwlink::{
    engine::{Event, SystemEvent},
    transport::{GenericTransport, TcpOptions, TcpTransport, Transport},
    Connect, DeviceProvider, Filter, Message, Session, WalletHandle,
};

mod helpers;
use helpers::*;

/// Hardware wallet command line utility
#[derive(Clone, PartialEq, Debug, Parser)]
struct Options {
    /// Supported transports for device discovery
    #[clap(long, value_enum, default_value = "any", env = "HWLINK_TARGET")]
    target: Filter,

    /// Device index (where more than one device is available)
    #[clap(long, default_value = "0")]
    device_index: usize,

    /// Relay options, used in place of discovery with `--target tcp`
    #[clap(flatten)]
    tcp: TcpOptions,

    /// Subcommand to execute
    #[clap(subcommand)]
    cmd: Actions,

    /// Enable verbose logging
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[derive(Clone, PartialEq, Debug, Parser)]
#[non_exhaustive]
enum Actions {
    /// List available devices
    List,

    /// Ping the device
    Ping {
        /// Text to be echoed by the device
        #[clap(default_value = "hello")]
        text: String,

        /// Require on-device confirmation
        #[clap(long)]
        button: bool,
    },

    /// Initialize the device session and fetch features
    Features,

    /// Print device events as they arrive
    Watch {
        /// Stop after the specified number of seconds
        #[clap(long)]
        timeout_s: Option<u64>,
    },

    /// Send a raw message and print the response
    Send {
        /// Message type (name or numeric identifier)
        #[clap(value_parser = parse_kind)]
        kind: u16,

        /// Hex encoded payload
        #[clap(default_value = "")]
        payload: HexData,

        /// Response timeout in seconds
        #[clap(long, default_value = "5")]
        timeout_s: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Options::parse();

    // Setup logging
    let _ = simplelog::SimpleLogger::init(args.log_level, simplelog::Config::default());

    let p = DeviceProvider::new()?;

    debug!("Using transport: {:?}", args.target);

    // Connect directly to the specified relay
    if args.target == Filter::Tcp && args.cmd != Actions::List {
        debug!("Using relay: {}", args.tcp.socket_addr());

        let s = Connect::<TcpTransport>::connect(&p, &args.tcp).await?;
        return execute(s, args.cmd).await;
    }

    // List available devices
    let devices = p.list_devices(args.target).await;
    if devices.is_empty() {
        return Err(anyhow::anyhow!("No devices found"));
    }

    // Handle list command
    if args.cmd == Actions::List {
        info!("Devices:");
        for (i, d) in devices.iter().enumerate() {
            info!("  {}: {}", i, d);
        }

        return Ok(());
    }

    // Select device by index
    if args.device_index >= devices.len() {
        return Err(anyhow::anyhow!(
            "Invalid device index: {} (max: {})",
            args.device_index,
            devices.len() - 1
        ));
    }

    debug!(
        "Using device {}: {}",
        args.device_index, devices[args.device_index]
    );

    // Connect to device
    let s = match Connect::<GenericTransport>::connect(&p, &devices[args.device_index]).await {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to connect to device: {}", devices[args.device_index]);
            return Err(e.into());
        }
    };

    // Execute command
    execute(s, args.cmd).await?;

    Ok(())
}

/// Execute a command with the provided session
async fn execute<T: Transport>(s: Session<T>, cmd: Actions) -> anyhow::Result<()> {
    debug!("Executing command: {:?}", cmd);

    match cmd {
        Actions::Ping { text, button } => {
            let mut w = WalletHandle::from(s);

            let r = w.ping(&text, button).await?;

            info!("ping response: '{}'", r);
        }
        Actions::Features => {
            let mut w = WalletHandle::from(s);

            let f = w.initialize().await?;

            info!("features: {:#?}", f);
            info!("firmware version: {}", f.version());
            info!("wallet state: {}", w.state());
        }
        Actions::Watch { timeout_s } => {
            let mut w = WalletHandle::from(s);
            let timeout = timeout_s.map(Duration::from_secs);

            loop {
                match w.next(timeout).await {
                    Ok(Some((evt, o))) => {
                        info!("{:?} ({} -> {}, {})", evt, o.previous, o.state, o.effect)
                    }
                    Ok(None) => {
                        info!("timeout");
                        break;
                    }
                    Err(e) => {
                        info!("session ended: {}", e);
                        break;
                    }
                }
            }
        }
        Actions::Send {
            kind,
            payload,
            timeout_s,
        } => {
            let req = Message::new(kind, payload.0);

            // Skip the connection event
            if let Some(e) = s.poll_event(Some(Duration::from_secs(1))).await {
                if e != Event::System(SystemEvent::Connected) {
                    warn!("unexpected event: {:?}", e);
                }
            }

            let resp = s
                .send_and_wait(&req, Duration::from_secs(timeout_s))
                .await?;

            match resp {
                Event::Protocol(m) => {
                    info!("response: {:?}", m);
                    info!("payload: {}", hex::encode(&m.payload));
                }
                Event::System(e) => warn!("system event: {}", e),
            }

            s.close().await;
        }
        _ => (),
    }

    Ok(())
}
