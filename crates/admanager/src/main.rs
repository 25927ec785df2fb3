//! Headless placement driver.
//!
//! Loads an HTML page, scans it for placement markers against a recording ad
//! service, then replays the viewport widths given on the command line and
//! logs what the service was asked to do.
//!
//! Usage: `admanager <page.html> [initial-width [width...]]`
//!
//! Configuration comes from the JSON file named by `ADMANAGER_CONFIG`, or from
//! the `ADMANAGER_*` environment variables otherwise.

use ad_slots::{AdManager, ManagerConfig, PageEvent, RecordingService, ServiceCall, command_queue};
use anyhow::{Error, Result, anyhow};
use dom::{DomIndex, Document, KeyAllocator, parse_html};
use env_logger::init as env_logger_init;
use log::info;
use std::{env, fs};
use tokio::sync::mpsc;
use tokio::time::sleep;

const DEFAULT_WIDTH: u32 = 1024;
const VIEWPORT_HEIGHT: u32 = 768;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger_init();

    let mut args = env::args().skip(1);
    let path = args
        .next()
        .ok_or_else(|| anyhow!("usage: admanager <page.html> [initial-width [width...]]"))?;
    let mut widths = args
        .map(|arg| {
            arg.parse::<u32>()
                .map_err(|err| anyhow!("invalid viewport width '{arg}': {err}"))
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter();
    let initial_width = widths.next().unwrap_or(DEFAULT_WIDTH);

    let config = load_config()?;
    let settle = config.resize_debounce() * 2;
    info!("Loading {path} at {initial_width}px");

    let html = fs::read_to_string(&path)?;
    let mut document = Document::new();
    let mirror = document.mirror(DomIndex::new());
    document.apply_batch(parse_html(&html, &mut KeyAllocator::new(1))?)?;

    let (service, journal) = RecordingService::new();
    let (queue, runner) = command_queue(service);
    let runner = tokio::spawn(runner.run());

    let mut manager = AdManager::new(config, mirror, queue, initial_width);
    manager.activate_and_scan().await?;
    let written = document.update();
    info!("Applied {written} id write-back batches to the page");

    let (events, receiver) = mpsc::unbounded_channel();
    let feeder = tokio::spawn(async move {
        for width in widths {
            events.send(PageEvent::Resized {
                width,
                height: VIEWPORT_HEIGHT,
            })?;
            sleep(settle).await;
        }
        events.send(PageEvent::Shutdown)?;
        Ok::<(), Error>(())
    });
    manager.run(receiver).await;
    feeder.await??;

    let registry = manager.registry();
    for id in registry.ids() {
        if let Some(slot) = registry.get(id) {
            let sizes: Vec<String> = slot.sizes.iter().map(ToString::to_string).collect();
            info!("{id} ({}): [{}]", slot.position, sizes.join(", "));
        }
    }

    let final_width = manager.viewport_width();
    // Closing the queue lets the runner finish.
    drop(manager);
    runner.await?;
    let calls = journal.snapshot();
    let refreshes = calls
        .iter()
        .filter(|call| **call == ServiceCall::RefreshAll)
        .count();
    info!(
        "{} ad service calls, {refreshes} refreshes, final width {final_width}px",
        calls.len()
    );
    Ok(())
}

fn load_config() -> Result<ManagerConfig> {
    match env::var("ADMANAGER_CONFIG") {
        Ok(path) => ManagerConfig::from_json_str(&fs::read_to_string(&path)?),
        Err(_) => Ok(ManagerConfig::from_env()),
    }
}
