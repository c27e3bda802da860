// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bluetooth Helper command line tool

use anyhow::{anyhow, Result};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bluetooth_helper::bluetooth::BluezAdapter;
use bluetooth_helper::{BluetoothHelper, Config, EventBus, LocalEventBus};

const USAGE: &str = "usage: bluetooth-helper <scan | pair <address>>";

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first, it carries the log level
    let config = Config::load()?;

    // Initialize logging
    let directive = format!("bluetooth_helper={}", config.logging.level);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .init();

    info!("Starting Bluetooth Helper v{}...", env!("CARGO_PKG_VERSION"));

    let bus: Arc<dyn EventBus> = Arc::new(LocalEventBus::new()?);
    let adapter = BluezAdapter::new(
        bus.clone(),
        Duration::from_secs(config.bluez.scan_window_secs),
    )
    .await?;
    let helper = BluetoothHelper::new(Arc::new(adapter), bus, config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["scan"] => scan(&helper).await,
        ["pair", address] => pair(&helper, address).await,
        _ => {
            eprintln!("{}", USAGE);
            Err(anyhow!("invalid arguments"))
        }
    }
}

async fn scan(helper: &BluetoothHelper) -> Result<()> {
    let request = helper.search_request().build();
    let mut found = request.perform();

    loop {
        tokio::select! {
            item = found.next() => match item {
                Some(Ok(device)) => println!("{}", device),
                Some(Err(e)) => {
                    error!("Discovery failed: {}", e);
                    return Err(e.into());
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                request.stop();
            }
        }
    }

    info!("Found {} device(s)", request.devices().len());
    Ok(())
}

async fn pair(helper: &BluetoothHelper, address: &str) -> Result<()> {
    match helper.pair_request(address).perform().await {
        Ok(device) => {
            println!("Paired with {}", device);
            Ok(())
        }
        Err(e) => {
            error!("Pairing failed: {}", e);
            Err(e.into())
        }
    }
}
