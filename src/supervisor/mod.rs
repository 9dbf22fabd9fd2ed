use std::{path::PathBuf, time::Duration};

use anyhow::{Context, Error};
use log::{error, info, warn};
use tokio::process::{Child, Command};

use crate::{config::WorkerConfig, TransportCommand};

// Grace period for a terminated worker to black out its pixels and exit
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns the single playback worker of the split-process deployment. A play
/// trigger replaces any running worker with a fresh one; advance moves the
/// schedule slot the next worker will play; shutdown terminates whatever is
/// running. All of it happens on one task, so a trigger arriving while a
/// kill-wait is in progress queues behind it instead of racing it.
pub struct Supervisor {
    config: WorkerConfig,
    schedule: PathBuf,
    grid_side: usize,
    entry_index: usize,
    entry_count: usize,
    worker: Option<Child>,
}

impl Supervisor {
    pub fn new(
        config: WorkerConfig,
        schedule: PathBuf,
        grid_side: usize,
        entry_index: usize,
        entry_count: usize,
    ) -> Self {
        Self {
            config,
            schedule,
            grid_side,
            entry_index,
            entry_count,
            worker: None,
        }
    }

    pub fn entry_index(&self) -> usize {
        self.entry_index
    }

    pub fn has_worker(&self) -> bool {
        self.worker.is_some()
    }

    /// React to one decoded transport command. Worker failures are reported
    /// and leave the supervisor ready for the next trigger; they never bring
    /// the listener down.
    pub async fn handle(&mut self, command: TransportCommand) {
        match command {
            TransportCommand::Play => {
                if let Err(e) = self.relaunch().await {
                    error!("failed to launch playback worker: {e:#}");
                }
            }
            TransportCommand::Advance => {
                self.entry_index = (self.entry_index + 1) % self.entry_count.max(1);
                info!("next trigger will play schedule entry {}", self.entry_index);
            }
            TransportCommand::Pause => {
                self.terminate().await;
            }
        }
    }

    /// Terminate any running worker, then start a new one on the current
    /// schedule entry. On spawn failure no worker is considered active.
    pub async fn relaunch(&mut self) -> Result<(), Error> {
        self.terminate().await;

        let mut pieces = self.config.wrapper.iter();
        let mut command = match pieces.next() {
            Some(wrapper) => {
                let mut command = Command::new(wrapper);
                command.args(pieces);
                command.arg(&self.config.program);
                command
            }
            None => Command::new(&self.config.program),
        };
        command
            .arg(&self.schedule)
            .arg(self.grid_side.to_string())
            .arg(self.entry_index.to_string());

        let child = command
            .spawn()
            .with_context(|| format!("spawning {:?}", self.config.program))?;

        info!(
            "playback worker started for entry {} (pid {:?})",
            self.entry_index,
            child.id()
        );
        self.worker = Some(child);
        Ok(())
    }

    /// SIGTERM the worker and wait for it to exit, so it gets the chance to
    /// black out its pixels. A worker that outstays the grace period is
    /// killed outright. No-op when nothing is running.
    pub async fn terminate(&mut self) {
        let Some(mut child) = self.worker.take() else {
            return;
        };

        match child.id() {
            Some(pid) => {
                info!("terminating playback worker (pid {pid})");
                // SAFETY: plain kill(2) on a pid we still own
                unsafe {
                    libc::kill(pid as libc::pid_t, libc::SIGTERM);
                }

                match tokio::time::timeout(TERMINATE_TIMEOUT, child.wait()).await {
                    Ok(Ok(status)) => info!("playback worker exited with {status}"),
                    Ok(Err(e)) => warn!("failed waiting for playback worker: {e}"),
                    Err(_) => {
                        warn!("playback worker ignored SIGTERM, killing it");
                        let _ = child.kill().await;
                    }
                }
            }
            // Already reaped
            None => {
                let _ = child.wait().await;
            }
        }
    }

    /// Process-exit path: make sure no worker outlives the listener.
    pub async fn shutdown(&mut self) {
        self.terminate().await;
    }
}
