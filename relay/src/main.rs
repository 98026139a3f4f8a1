// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{path::PathBuf, sync::Arc};

use clap::{parser::ValueSource, ArgMatches, CommandFactory, FromArgMatches, Parser};
use log::{debug, info, LevelFilter};

use hwlink::{
    relay::{Relay, RelayConfig},
    transport::{GenericTransport, Transport},
    Connect, DeviceProvider, Filter, Session,
};

/// Hardware wallet relay
///
/// This connects to a local device and exposes it to TCP clients,
/// serialising requests so multiple applications can share the device.
#[derive(Clone, Debug, PartialEq, Parser)]
pub struct Args {
    /// Transports for device discovery
    #[clap(long, value_enum, default_value = "hid", env = "HWLINK_TARGET")]
    target: Filter,

    /// Device index (where more than one device is available)
    #[clap(long, default_value = "0")]
    device_index: usize,

    /// Relay configuration file (TOML), overridden by explicit flags
    #[clap(long, env = "HWLINK_RELAY_CONFIG")]
    config: Option<PathBuf>,

    #[clap(flatten)]
    relay: RelayConfig,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let matches = Args::command().get_matches();
    let args = Args::from_arg_matches(&matches)?;

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    c.add_filter_ignore_str("hwlink::transport");

    let _ = simplelog::SimpleLogger::init(args.log_level, c.build());

    let config = load_config(&args, &matches).await?;

    debug!("relay config: {:?}", config);

    // Connect to the device
    let p = DeviceProvider::new()?;
    let d = p.select(args.target, args.device_index).await?;

    info!("Using device: {}", d);

    let s = Connect::<GenericTransport>::connect(&p, &d).await?;
    if !s.is_open() {
        return Err(anyhow::anyhow!("Failed to open device: {}", d));
    }

    run_relay(config, s).await
}

/// Merge the config file (if any) with options set on the command line or environment
async fn load_config(args: &Args, matches: &ArgMatches) -> anyhow::Result<RelayConfig> {
    let path = match &args.config {
        Some(p) => p,
        None => return Ok(args.relay.clone()),
    };

    debug!("Loading config from {}", path.display());

    let s = tokio::fs::read_to_string(path).await?;
    let mut c: RelayConfig = toml::from_str(&s)?;

    let explicit = |id: &str| {
        matches!(
            matches.value_source(id),
            Some(ValueSource::CommandLine | ValueSource::EnvVariable)
        )
    };

    if explicit("bind") {
        c.bind = args.relay.bind;
    }
    if explicit("port") {
        c.port = args.relay.port;
    }
    if explicit("max_queued_requests") {
        c.max_queued_requests = args.relay.max_queued_requests;
    }
    if explicit("client_idle_timeout") {
        c.client_idle_timeout = args.relay.client_idle_timeout;
    }
    if explicit("exchange_timeout") {
        c.exchange_timeout = args.relay.exchange_timeout;
    }

    Ok(c)
}

async fn run_relay<T: Transport>(config: RelayConfig, s: Session<T>) -> anyhow::Result<()> {
    let relay = Relay::new(config, Arc::new(s));

    let bound = relay.bind().await?;

    // Await device loss or exit signal
    tokio::select!(
        r = bound.run() => {
            r?;
            info!("Device disconnected, exiting");
        }
        // Exit on ctrl + c
        _ = tokio::signal::ctrl_c() => {
            debug!("Exit!");
        },
    );

    Ok(())
}
