// Copyright (c) 2022-2023 The MobileCoin Foundation

use clap::Parser;
use log::{debug, info, LevelFilter};
use strum::{Display, EnumString, EnumVariantNames};

use hwlink::{transport::GenericTransport, Connect, DeviceProvider, Filter};

/// Test CLI arguments
#[derive(Clone, Debug, Parser)]
pub struct Opts {
    #[clap(subcommand)]
    pub test: Tests,

    /// Target for test execution
    #[clap(long, value_enum, default_value = "any", env)]
    pub target: Filter,

    /// Device index (where more than one device is available)
    #[clap(long, default_value = "0", env)]
    pub device_index: usize,

    /// Log level
    #[clap(long, default_value = "debug", env)]
    pub log_level: LevelFilter,

    /// Enable logging for transports
    #[clap(long)]
    pub log_transports: bool,
}

/// Test modes
#[derive(Clone, PartialEq, Debug, Parser, Display, EnumString, EnumVariantNames)]
pub enum Tests {
    /// Initialise the device and check features
    Features,
    /// Ping the device (requires button confirmation)
    Ping {
        /// Text to be echoed
        #[clap(long, default_value = "hwlink")]
        text: String,
    },
    /// Check responses to back to back requests arrive in order
    Ordering {
        /// Number of requests
        #[clap(long, default_value = "8")]
        n: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load command line options
    let opts = Opts::parse();

    // Setup logging
    let mut c = simplelog::ConfigBuilder::new();
    if !opts.log_transports {
        c.add_filter_ignore_str("hwlink::transport");
    }

    let _ = simplelog::SimpleLogger::init(opts.log_level, c.build());

    debug!("options: {:?}", opts);

    info!("Running test '{}' via {}", opts.test, opts.target);

    // Connect to target
    let p = DeviceProvider::new()?;
    let d = p.select(opts.target, opts.device_index).await?;

    info!("Using device: {}", d);

    let s = Connect::<GenericTransport>::connect(&p, &d).await?;

    // Execute test
    match opts.test {
        Tests::Features => {
            hwlink_tests::features::test(s).await?;
        }
        Tests::Ping { text } => {
            let approve = || async {
                info!("Confirm the ping on the device");
            };
            hwlink_tests::ping::test(s, approve, &text).await?
        }
        Tests::Ordering { n } => hwlink_tests::ordering::test(s, n).await?,
    }

    log::info!("Test OK!");

    Ok(())
}
