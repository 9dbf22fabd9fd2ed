use std::time::Duration;

use anyhow::{bail, Context, Error};
use log::{info, warn};
use pixel_show::prelude::*;
use tokio::sync::mpsc;

#[cfg(feature = "pi")]
use pixel_show::driver::I2cBus;

#[cfg(not(feature = "pi"))]
use pixel_show::driver::MemoryBus;

#[cfg(feature = "pi")]
type Bus = I2cBus;

#[cfg(not(feature = "pi"))]
type Bus = MemoryBus;

struct Args {
    schedule: String,
    grid_side: usize,
    entry_index: Option<usize>,
    listen: bool,
}

fn parse_args() -> Result<Args, Error> {
    let mut args = std::env::args().skip(1);

    let schedule = args
        .next()
        .context("usage: pixel-show <schedule.json> <grid-side> [entry-index|--listen]")?;
    let grid_side = args
        .next()
        .context("missing <grid-side>")?
        .parse::<usize>()
        .context("<grid-side> must be an integer")?;

    let mut entry_index = None;
    let mut listen = false;
    if let Some(extra) = args.next() {
        if extra == "--listen" {
            listen = true;
        } else {
            entry_index = Some(extra.parse().context("[entry-index] must be an integer")?);
        }
    }

    Ok(Args {
        schedule,
        grid_side,
        entry_index,
        listen,
    })
}

fn connect_drivers(config: &Config) -> Result<Vec<Pca9635<Bus>>, DriverError> {
    let mut drivers = Vec::with_capacity(config.driver_addresses.len());

    for &address in &config.driver_addresses {
        #[cfg(feature = "pi")]
        let mut chip = Pca9635::connect(config.i2c_bus, address)?;

        #[cfg(not(feature = "pi"))]
        let mut chip = {
            warn!("no I2C on this platform, driving an in-memory chip at 0x{address:02X}");
            Pca9635::new(MemoryBus::new(address))
        };

        chip.initialize()?;
        drivers.push(chip);
    }

    Ok(drivers)
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let args = parse_args()?;
    let config = Config::load_or_default()?;

    let pixel_count = args.grid_side * args.grid_side;
    let frame_size = pixel_count * 3;

    let entries = load_schedule(&args.schedule)?;
    let playlist: Vec<String> = entries.iter().map(|e| e.filename.clone()).collect();

    let map = match &config.channel_map {
        Some(table) => ChannelMap::new(table.clone(), pixel_count, config.driver_addresses.len())?,
        None => ChannelMap::sequential(pixel_count, config.driver_addresses.len())?,
    };

    let drivers = connect_drivers(&config)?;
    info!("initialized {} driver chips", drivers.len());

    let mut engine = PlaybackEngine::new(
        drivers,
        map,
        config.scaler,
        FrameStore::new(&config.animation_dir, frame_size),
        playlist,
        Duration::from_millis(config.frame_interval_ms),
        args.grid_side,
    )?;

    let outcome: Result<(), Error> = if let Some(index) = args.entry_index {
        // Worker mode: play one schedule entry through and exit
        tokio::select! {
            result = engine.run_once(index) => result.map_err(Error::from),
            _ = shutdown_signal() => {
                info!("termination signal received");
                Ok(())
            }
        }
    } else if args.listen {
        run_listening(&mut engine, &config).await
    } else {
        // Scheduled mode: every entry must carry a wall-clock time
        let mut timed = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry.cue {
                Cue::At(at) => timed.push((entry.filename, at)),
                Cue::Index(_) => {
                    bail!("schedule entry {:?} has no time; scheduled playback needs one per entry", entry.filename)
                }
            }
        }

        tokio::select! {
            result = engine.run_scheduled(timed) => result.map_err(Error::from),
            _ = shutdown_signal() => {
                info!("termination signal received");
                Ok(())
            }
        }
    };

    // Every exit path leaves the hardware dark
    engine.blackout()?;
    outcome?;
    Ok(())
}

/// Single-process deployment: decode the pulse signal on this process and
/// feed the transport directly.
#[cfg(feature = "pi")]
async fn run_listening(engine: &mut PlaybackEngine<Bus>, config: &Config) -> Result<(), Error> {
    let (tx, rx) = mpsc::channel(8);

    let decoder = PulseDecoder::new(
        config.trigger.bands.clone(),
        config.trigger.tolerance_us,
        Duration::from_millis(config.trigger.cooldown_ms),
    );
    let _trigger = GpioTrigger::attach(config.trigger.gpio_pin, decoder, tx)
        .context("failed to attach trigger GPIO")?;

    info!(
        "listening for pulse triggers on GPIO {}",
        config.trigger.gpio_pin
    );

    tokio::select! {
        result = engine.run_transport(rx) => result.map_err(Error::from),
        _ = shutdown_signal() => {
            info!("termination signal received");
            Ok(())
        }
    }
}

#[cfg(not(feature = "pi"))]
async fn run_listening(engine: &mut PlaybackEngine<Bus>, _config: &Config) -> Result<(), Error> {
    warn!("pulse triggers are not supported on this platform; commands only arrive via the channel");
    let (_tx, rx) = mpsc::channel(8);

    tokio::select! {
        result = engine.run_transport(rx) => result.map_err(Error::from),
        _ = shutdown_signal() => {
            info!("termination signal received");
            Ok(())
        }
    }
}
