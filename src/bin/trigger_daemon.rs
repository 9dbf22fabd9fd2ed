use std::path::PathBuf;

use anyhow::{Context, Error};
use log::info;
use pixel_show::prelude::*;
use tokio::sync::mpsc;

#[cfg(feature = "pi")]
use std::time::Duration;

#[cfg(not(feature = "pi"))]
use log::warn;

struct Args {
    schedule: PathBuf,
    grid_side: usize,
    start_index: usize,
}

fn parse_args() -> Result<Args, Error> {
    let mut args = std::env::args().skip(1);

    let schedule = args
        .next()
        .context("usage: pixel-show-trigger <schedule.json> <grid-side> [start-index]")?
        .into();
    let grid_side = args
        .next()
        .context("missing <grid-side>")?
        .parse::<usize>()
        .context("<grid-side> must be an integer")?;
    let start_index = match args.next() {
        Some(index) => index.parse().context("[start-index] must be an integer")?,
        None => 0,
    };

    Ok(Args {
        schedule,
        grid_side,
        start_index,
    })
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = parse_args()?;
    let config = Config::load_or_default()?;

    // Parse the schedule up front so a broken file fails here, not on the
    // first trigger of the night
    let entries = load_schedule(&args.schedule)?;

    let (tx, mut rx) = mpsc::channel(8);

    #[cfg(feature = "pi")]
    let _trigger = {
        let decoder = PulseDecoder::new(
            config.trigger.bands.clone(),
            config.trigger.tolerance_us,
            Duration::from_millis(config.trigger.cooldown_ms),
        );
        GpioTrigger::attach(config.trigger.gpio_pin, decoder, tx.clone())
            .context("failed to attach trigger GPIO")?
    };

    #[cfg(not(feature = "pi"))]
    warn!("pulse triggers are not supported on this platform; waiting for shutdown only");

    let mut supervisor = Supervisor::new(
        config.worker,
        args.schedule,
        args.grid_side,
        args.start_index,
        entries.len(),
    );

    info!(
        "[READY] waiting for pulse trigger on GPIO {}",
        config.trigger.gpio_pin
    );

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    // One command at a time: a trigger arriving during a kill-wait queues in
    // the channel instead of spawning concurrently
    loop {
        tokio::select! {
            Some(command) = rx.recv() => supervisor.handle(command).await,
            _ = &mut shutdown => {
                info!("termination signal received");
                break;
            }
        }
    }

    supervisor.shutdown().await;
    drop(tx);
    Ok(())
}
