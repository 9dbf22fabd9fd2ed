use serde::{Deserialize, Serialize};

pub mod config;
pub mod driver;
pub mod frames;
pub mod pixel;
pub mod player;
pub mod schedule;
pub mod supervisor;
pub mod trigger;

pub mod prelude {
    pub use crate::{
        config::*, driver::*, frames::*, pixel::*, player::*, schedule::*, supervisor::*,
        trigger::*,
    };
    pub use crate::{shutdown_signal, TransportCommand};
}

/// Transport commands decoded from the external pulse signal. In the
/// single-process deployment they drive the playback engine directly; in the
/// split-process deployment the supervisor turns them into worker lifecycle
/// changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportCommand {
    /// Move to the next file in the playlist and stop at its first frame
    Advance,
    /// Start or resume playback of the current file
    Play,
    /// Pause playback, keeping the resume point
    Pause,
}

/// Resolves when the process receives SIGINT or SIGTERM. Both binaries wait
/// on this so pixels can be forced off before the bus handle is dropped.
pub async fn shutdown_signal() {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .expect("failed to register SIGTERM handler");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}
