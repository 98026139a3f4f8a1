// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::{str::FromStr, time::Duration};

use log::LevelFilter;
use simplelog::SimpleLogger;

use hwlink::{engine::Event, transport::Transport, Session};

/// Default timeout for test operations
#[allow(unused)]
pub const TIMEOUT: Duration = Duration::from_secs(2);

/// Setup logging, level from the `LOG_LEVEL` environment variable
pub fn setup() {
    let log_level = match std::env::var("LOG_LEVEL").map(|v| LevelFilter::from_str(&v)) {
        Ok(Ok(l)) => l,
        _ => LevelFilter::Debug,
    };

    let _ = SimpleLogger::init(log_level, simplelog::Config::default());
}

/// Poll the next event with the default timeout
#[allow(unused)]
pub async fn next_event<T: Transport>(s: &Session<T>) -> Option<Event> {
    s.poll_event(Some(TIMEOUT)).await
}

/// Wait for a condition to become true, polling every 10ms
#[allow(unused)]
pub async fn wait_for<F: FnMut() -> bool>(mut f: F) -> bool {
    for _ in 0..200 {
        if f() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
