use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::TransportCommand;

#[cfg(feature = "pi")]
use log::warn;

/// A reference pulse width and the transport command it encodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PulseBand {
    pub width_us: u32,
    pub command: TransportCommand,
}

/// Edge direction of the observed signal level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Decodes high-pulse widths into transport commands. A rising edge records
/// its tick; the following falling edge measures the width and classifies it
/// against the configured bands within a fixed tolerance. Widths matching no
/// band are ignored, and an accepted command opens a cooldown window that
/// swallows re-triggers caused by signal bounce.
///
/// The decoder runs inside the GPIO edge callback, so it never blocks and
/// never touches the LED bus; it only mutates its own ticks.
pub struct PulseDecoder {
    bands: Vec<PulseBand>,
    tolerance_us: u32,
    cooldown_us: u64,
    rise_tick: Option<u64>,
    last_accept_tick: Option<u64>,
}

impl PulseDecoder {
    pub fn new(bands: Vec<PulseBand>, tolerance_us: u32, cooldown: Duration) -> Self {
        Self {
            bands,
            tolerance_us,
            cooldown_us: cooldown.as_micros() as u64,
            rise_tick: None,
            last_accept_tick: None,
        }
    }

    /// Feed one edge with its monotonic tick in microseconds. Returns a
    /// command when a complete pulse classifies into a band outside the
    /// cooldown window.
    pub fn edge(&mut self, edge: Edge, tick_us: u64) -> Option<TransportCommand> {
        match edge {
            Edge::Rising => {
                self.rise_tick = Some(tick_us);
                None
            }
            Edge::Falling => {
                let rise = self.rise_tick.take()?;
                let width = tick_us.saturating_sub(rise) as u32;

                if let Some(last) = self.last_accept_tick {
                    let since = tick_us.saturating_sub(last);
                    if since < self.cooldown_us {
                        debug!("pulse of {width}us ignored, {since}us into cooldown");
                        return None;
                    }
                }

                let command = self.classify(width)?;
                self.last_accept_tick = Some(tick_us);
                debug!("pulse of {width}us decoded as {command:?}");
                Some(command)
            }
        }
    }

    fn classify(&self, width_us: u32) -> Option<TransportCommand> {
        self.bands
            .iter()
            .find(|band| width_us.abs_diff(band.width_us) <= self.tolerance_us)
            .map(|band| band.command)
    }
}

/// Owns the trigger input pin and forwards decoded commands from the GPIO
/// interrupt context into the player's command channel. The callback only
/// does a non-blocking send; a full queue drops the command rather than
/// stalling the interrupt context.
#[cfg(feature = "pi")]
pub struct GpioTrigger {
    _pin: rppal::gpio::InputPin,
}

#[cfg(feature = "pi")]
impl GpioTrigger {
    pub fn attach(
        pin_number: u8,
        mut decoder: PulseDecoder,
        sender: tokio::sync::mpsc::Sender<TransportCommand>,
    ) -> Result<Self, rppal::gpio::Error> {
        use rppal::gpio::{Event, Gpio, Trigger};

        let mut pin = Gpio::new()?.get(pin_number)?.into_input_pulldown();

        pin.set_async_interrupt(Trigger::Both, None, move |event: Event| {
            let edge = match event.trigger {
                Trigger::RisingEdge => Edge::Rising,
                Trigger::FallingEdge => Edge::Falling,
                _ => return,
            };
            let tick_us = event.timestamp.as_micros() as u64;

            if let Some(command) = decoder.edge(edge, tick_us) {
                if sender.try_send(command).is_err() {
                    warn!("transport command {command:?} dropped, queue full");
                }
            }
        })?;

        Ok(Self { _pin: pin })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> PulseDecoder {
        PulseDecoder::new(
            vec![
                PulseBand {
                    width_us: 1000,
                    command: TransportCommand::Play,
                },
                PulseBand {
                    width_us: 1200,
                    command: TransportCommand::Pause,
                },
                PulseBand {
                    width_us: 1400,
                    command: TransportCommand::Advance,
                },
            ],
            10,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_pulse_within_band_classifies() {
        let mut decoder = decoder();
        assert_eq!(None, decoder.edge(Edge::Rising, 100));
        assert_eq!(
            Some(TransportCommand::Play),
            decoder.edge(Edge::Falling, 100 + 1008)
        );
    }

    #[test]
    fn test_cooldown_swallows_repeat() {
        let mut decoder = decoder();
        decoder.edge(Edge::Rising, 0);
        assert_eq!(Some(TransportCommand::Play), decoder.edge(Edge::Falling, 1000));

        // Same pulse again 2s later, well inside the 5s cooldown
        decoder.edge(Edge::Rising, 2_000_000);
        assert_eq!(None, decoder.edge(Edge::Falling, 2_001_000));

        // After the cooldown the pulse classifies again
        decoder.edge(Edge::Rising, 7_000_000);
        assert_eq!(
            Some(TransportCommand::Play),
            decoder.edge(Edge::Falling, 7_001_000)
        );
    }

    #[test]
    fn test_width_outside_all_bands_is_ignored() {
        let mut decoder = decoder();
        decoder.edge(Edge::Rising, 0);
        assert_eq!(None, decoder.edge(Edge::Falling, 1300));

        // An ignored width must not start a cooldown
        decoder.edge(Edge::Rising, 2000);
        assert_eq!(
            Some(TransportCommand::Pause),
            decoder.edge(Edge::Falling, 2000 + 1195)
        );
    }

    #[test]
    fn test_falling_edge_without_rise_is_ignored() {
        let mut decoder = decoder();
        assert_eq!(None, decoder.edge(Edge::Falling, 1000));
    }
}
