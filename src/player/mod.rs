use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Local};
use log::{debug, info, warn};
use thiserror::Error;
use tokio::{
    sync::mpsc,
    time::{interval_at, Instant, Interval},
};

use crate::{
    driver::{DriverError, Pca9635, RegisterBus},
    frames::{Frame, FrameStore, ValidationError},
    pixel::{ChannelMap, ColorScaler, PixelError},
    TransportCommand,
};

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error(transparent)]
    Driver(#[from] DriverError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Pixel(#[from] PixelError),
    #[error("the playlist holds no animation files")]
    EmptyPlaylist,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayerState {
    Stopped,
    Playing,
    Paused,
}

/// Walks an animation's frames at a fixed cadence, fanning each frame out
/// through the channel map and colour scaler into the driver chips.
///
/// The transport state machine is synchronous; the async wrappers below pace
/// it. Commands arriving mid-frame take effect at the next tick boundary,
/// because one frame's register writes are never interrupted.
pub struct PlaybackEngine<B> {
    drivers: Vec<Pca9635<B>>,
    map: ChannelMap,
    scaler: ColorScaler,
    store: FrameStore,
    playlist: Vec<String>,
    frames: Arc<Vec<Frame>>,
    file_index: usize,
    frame_index: usize,
    state: PlayerState,
    period: Duration,
    grid_side: usize,
}

impl<B: RegisterBus> PlaybackEngine<B> {
    pub fn new(
        drivers: Vec<Pca9635<B>>,
        map: ChannelMap,
        scaler: ColorScaler,
        mut store: FrameStore,
        playlist: Vec<String>,
        period: Duration,
        grid_side: usize,
    ) -> Result<Self, PlayerError> {
        if playlist.is_empty() {
            return Err(PlayerError::EmptyPlaylist);
        }

        // Eager load so a bad first file fails at startup, not mid-show
        let frames = store.get(&playlist[0])?;

        Ok(Self {
            drivers,
            map,
            scaler,
            store,
            playlist,
            frames,
            file_index: 0,
            frame_index: 0,
            state: PlayerState::Stopped,
            period,
            grid_side,
        })
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn cursor(&self) -> (usize, usize) {
        (self.file_index, self.frame_index)
    }

    pub fn drivers(&self) -> &[Pca9635<B>] {
        &self.drivers
    }

    /// Apply one transport command.
    pub fn apply(&mut self, command: TransportCommand) -> Result<(), PlayerError> {
        info!("transport command: {command:?}");
        match command {
            TransportCommand::Advance => {
                self.file_index = (self.file_index + 1) % self.playlist.len();
                self.frame_index = 0;
                self.state = PlayerState::Stopped;
                self.frames = self.store.get(&self.playlist[self.file_index])?;
            }
            TransportCommand::Play => {
                if self.frames.is_empty() {
                    warn!("ignoring play, current file has no frames");
                } else {
                    self.state = PlayerState::Playing;
                }
            }
            TransportCommand::Pause => {
                self.state = PlayerState::Paused;
            }
        }
        Ok(())
    }

    /// One scheduler tick: render the current frame and move the cursor.
    /// The tick after the last frame wraps the cursor to the start and stops
    /// playback without rendering; a finished file does not auto-repeat.
    pub fn step(&mut self) -> Result<(), PlayerError> {
        if self.state != PlayerState::Playing {
            return Ok(());
        }

        if self.frame_index >= self.frames.len() {
            self.frame_index = 0;
            self.state = PlayerState::Stopped;
            info!("end of {}", self.playlist[self.file_index]);
            return Ok(());
        }

        let frames = self.frames.clone();
        self.render(&frames[self.frame_index])?;
        self.frame_index += 1;
        Ok(())
    }

    fn render(&mut self, frame: &Frame) -> Result<(), PlayerError> {
        for pixel in 0..self.map.pixel_count() {
            let outputs = *self.map.resolve(pixel)?;
            let [red, green, blue] = self.scaler.apply(frame.pixel(pixel));

            self.drivers[outputs.red.driver].set_channel_brightness(outputs.red.channel, red)?;
            self.drivers[outputs.green.driver]
                .set_channel_brightness(outputs.green.channel, green)?;
            self.drivers[outputs.blue.driver].set_channel_brightness(outputs.blue.channel, blue)?;
        }

        if log::log_enabled!(log::Level::Debug) {
            debug!("\n{}", frame.ansi_preview(self.grid_side));
        }

        Ok(())
    }

    /// Force every pixel dark. This is the mandatory cleanup on every exit
    /// path, so hardware is never left energized.
    pub fn blackout(&mut self) -> Result<(), PlayerError> {
        info!("blacking out all pixels");
        for pixel in 0..self.map.pixel_count() {
            let outputs = *self.map.resolve(pixel)?;
            for output in [outputs.red, outputs.green, outputs.blue] {
                self.drivers[output.driver].set_channel_brightness(output.channel, 0)?;
            }
        }
        Ok(())
    }

    /// Drive the transport from a command channel. While playing, frames are
    /// paced on an absolute deadline chain; while stopped or paused the task
    /// blocks on the channel and burns no cycles. Returns when every sender
    /// is gone.
    pub async fn run_transport(
        &mut self,
        mut commands: mpsc::Receiver<TransportCommand>,
    ) -> Result<(), PlayerError> {
        let mut ticker: Option<Interval> = None;

        loop {
            if self.state == PlayerState::Playing {
                let ticker = ticker.get_or_insert_with(|| cadence(self.period));
                tokio::select! {
                    _ = ticker.tick() => self.step()?,
                    command = commands.recv() => match command {
                        Some(command) => self.apply(command)?,
                        None => break,
                    },
                }
            } else {
                match commands.recv().await {
                    Some(command) => self.apply(command)?,
                    None => break,
                }
            }

            if self.state != PlayerState::Playing {
                // Next play starts a fresh deadline chain
                ticker = None;
            }
        }

        Ok(())
    }

    /// Play one file in the playlist from the top, returning when it ends.
    pub async fn run_once(&mut self, file_index: usize) -> Result<(), PlayerError> {
        self.file_index = file_index % self.playlist.len();
        self.frame_index = 0;
        self.frames = self.store.get(&self.playlist[self.file_index])?;
        self.state = PlayerState::Playing;

        // Render the first frame right away, then hold the deadline chain
        let mut ticker = cadence(self.period);
        while self.state == PlayerState::Playing {
            self.step()?;
            if self.state == PlayerState::Playing {
                ticker.tick().await;
            }
        }

        Ok(())
    }

    /// The time-of-day deployment: wait for each entry's wall-clock start,
    /// then play its file through once at the fixed cadence. Entries whose
    /// time already passed play immediately rather than being skipped.
    pub async fn run_scheduled(
        &mut self,
        mut entries: Vec<(String, DateTime<Local>)>,
    ) -> Result<(), PlayerError> {
        entries.sort_by_key(|(_, at)| *at);

        // Preload everything so a corrupt file surfaces before the show
        for (filename, _) in &entries {
            self.store.get(filename)?;
        }

        for (filename, at) in entries {
            let wait = (at - Local::now()).to_std().unwrap_or(Duration::ZERO);
            if wait > Duration::ZERO {
                info!("{filename}: starting in {}s", wait.as_secs());
                tokio::time::sleep(wait).await;
            } else {
                info!("{filename}: start time already passed, playing now");
            }

            let position = self
                .playlist
                .iter()
                .position(|name| name == &filename)
                .unwrap_or_else(|| {
                    self.playlist.push(filename.clone());
                    self.playlist.len() - 1
                });
            self.run_once(position).await?;
        }

        Ok(())
    }
}

/// A drift-free ticker: the first deadline is one period from now and every
/// later deadline is period-spaced from the previous deadline, not from
/// whenever the tick was serviced.
fn cadence(period: Duration) -> Interval {
    interval_at(Instant::now() + period, period)
}
