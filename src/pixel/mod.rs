use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::CHANNELS_PER_CHIP;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PixelError {
    #[error("pixel index {index} outside the grid of {count} pixels")]
    OutOfRange { index: usize, count: usize },
    #[error("channel map holds {entries} entries but the grid has {count} pixels")]
    WrongLength { entries: usize, count: usize },
    #[error("pixel {pixel} references driver {driver}, but only {drivers} chips are configured")]
    UnknownDriver {
        pixel: usize,
        driver: usize,
        drivers: usize,
    },
    #[error("pixel {pixel} references channel {channel}, past the chip's 16 outputs")]
    BadChannel { pixel: usize, channel: u8 },
    #[error("driver {driver} channel {channel} is wired to more than one output")]
    SharedChannel { driver: usize, channel: u8 },
    #[error("{count} pixels need {needed} channels, but {drivers} chips only provide {available}")]
    NotEnoughChannels {
        count: usize,
        needed: usize,
        drivers: usize,
        available: usize,
    },
}

/// One physical PWM output: a driver chip by position in the configured chip
/// list, and a channel on that chip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub driver: usize,
    pub channel: u8,
}

/// The three physical outputs behind one logical pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelOutputs {
    pub red: OutputRef,
    pub green: OutputRef,
    pub blue: OutputRef,
}

impl PixelOutputs {
    fn outputs(&self) -> [OutputRef; 3] {
        [self.red, self.green, self.blue]
    }
}

/// Static table from logical pixel index to physical outputs. The wiring is
/// arbitrary across chips, so the table is data, validated once at startup:
/// every pixel must resolve to three in-range outputs and no output may be
/// wired twice.
pub struct ChannelMap {
    table: Vec<PixelOutputs>,
}

impl ChannelMap {
    pub fn new(
        table: Vec<PixelOutputs>,
        pixel_count: usize,
        driver_count: usize,
    ) -> Result<Self, PixelError> {
        if table.len() != pixel_count {
            return Err(PixelError::WrongLength {
                entries: table.len(),
                count: pixel_count,
            });
        }

        let mut seen = HashSet::new();
        for (pixel, entry) in table.iter().enumerate() {
            for output in entry.outputs() {
                if output.driver >= driver_count {
                    return Err(PixelError::UnknownDriver {
                        pixel,
                        driver: output.driver,
                        drivers: driver_count,
                    });
                }
                if output.channel >= CHANNELS_PER_CHIP {
                    return Err(PixelError::BadChannel {
                        pixel,
                        channel: output.channel,
                    });
                }
                if !seen.insert(output) {
                    return Err(PixelError::SharedChannel {
                        driver: output.driver,
                        channel: output.channel,
                    });
                }
            }
        }

        Ok(Self { table })
    }

    /// The deployed wiring: R, G and B of each pixel on consecutive channels,
    /// pixels filling each chip in turn and spilling onto the next one.
    pub fn sequential(pixel_count: usize, driver_count: usize) -> Result<Self, PixelError> {
        let needed = pixel_count * 3;
        let available = driver_count * CHANNELS_PER_CHIP as usize;
        if needed > available {
            return Err(PixelError::NotEnoughChannels {
                count: pixel_count,
                needed,
                drivers: driver_count,
                available,
            });
        }

        let output = |index: usize| OutputRef {
            driver: index / CHANNELS_PER_CHIP as usize,
            channel: (index % CHANNELS_PER_CHIP as usize) as u8,
        };

        let table = (0..pixel_count)
            .map(|pixel| PixelOutputs {
                red: output(pixel * 3),
                green: output(pixel * 3 + 1),
                blue: output(pixel * 3 + 2),
            })
            .collect();

        Self::new(table, pixel_count, driver_count)
    }

    pub fn resolve(&self, pixel: usize) -> Result<&PixelOutputs, PixelError> {
        self.table.get(pixel).ok_or(PixelError::OutOfRange {
            index: pixel,
            count: self.table.len(),
        })
    }

    pub fn pixel_count(&self) -> usize {
        self.table.len()
    }
}

/// Per-colour linear brightness ceilings. The red and blue LEDs in the
/// deployed fixtures outshine the green ones, so the defaults pull those two
/// channels down to two thirds. This is a global calibration, applied to
/// every pixel alike.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorScaler {
    pub red_ceiling: u8,
    pub green_ceiling: u8,
    pub blue_ceiling: u8,
}

impl Default for ColorScaler {
    fn default() -> Self {
        Self {
            red_ceiling: 170,
            green_ceiling: 255,
            blue_ceiling: 170,
        }
    }
}

impl ColorScaler {
    /// Uncalibrated pass-through.
    pub fn unity() -> Self {
        Self {
            red_ceiling: 255,
            green_ceiling: 255,
            blue_ceiling: 255,
        }
    }

    /// `round(raw / 255 * ceiling)`, so 0 stays 0 and 255 lands exactly on
    /// the ceiling.
    pub fn scale(raw: u8, ceiling: u8) -> u8 {
        ((raw as u16 * ceiling as u16 + 127) / 255) as u8
    }

    pub fn apply(&self, [red, green, blue]: [u8; 3]) -> [u8; 3] {
        [
            Self::scale(red, self.red_ceiling),
            Self::scale(green, self.green_ceiling),
            Self::scale(blue, self.blue_ceiling),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_map_matches_deployed_wiring() {
        let map = ChannelMap::sequential(16, 3).unwrap();

        // Pixel 5 straddles the first two chips
        let outputs = map.resolve(5).unwrap();
        assert_eq!(
            &PixelOutputs {
                red: OutputRef {
                    driver: 0,
                    channel: 15
                },
                green: OutputRef {
                    driver: 1,
                    channel: 0
                },
                blue: OutputRef {
                    driver: 1,
                    channel: 1
                },
            },
            outputs
        );

        let last = map.resolve(15).unwrap();
        assert_eq!(
            OutputRef {
                driver: 2,
                channel: 15
            },
            last.blue
        );
    }

    #[test]
    fn test_resolve_is_total_and_collision_free() {
        let map = ChannelMap::sequential(16, 3).unwrap();

        let mut seen = HashSet::new();
        for pixel in 0..16 {
            let outputs = map.resolve(pixel).unwrap();
            for output in [outputs.red, outputs.green, outputs.blue] {
                assert!(seen.insert(output), "output wired twice: {:?}", output);
            }
        }

        assert_eq!(
            Err(PixelError::OutOfRange {
                index: 16,
                count: 16
            }),
            map.resolve(16).map(|_| ())
        );
    }

    #[test]
    fn test_map_rejects_shared_channel() {
        let shared = OutputRef {
            driver: 0,
            channel: 2,
        };
        let table = vec![PixelOutputs {
            red: shared,
            green: OutputRef {
                driver: 0,
                channel: 1,
            },
            blue: shared,
        }];

        assert_eq!(
            Err(PixelError::SharedChannel {
                driver: 0,
                channel: 2
            }),
            ChannelMap::new(table, 1, 1).map(|_| ())
        );
    }

    #[test]
    fn test_map_rejects_insufficient_channels() {
        // A 4x4 grid needs 48 channels; two chips only have 32
        assert!(ChannelMap::sequential(16, 2).is_err());
    }

    #[test]
    fn test_scale_endpoints_and_monotonicity() {
        assert_eq!(0, ColorScaler::scale(0, 170));
        assert_eq!(170, ColorScaler::scale(255, 170));
        assert_eq!(255, ColorScaler::scale(255, 255));

        let mut previous = 0;
        for raw in 0..=255u8 {
            let scaled = ColorScaler::scale(raw, 170);
            assert!(scaled >= previous);
            previous = scaled;
        }
    }

    #[test]
    fn test_default_scaler_pulls_red_and_blue() {
        let scaler = ColorScaler::default();
        assert_eq!([170, 255, 170], scaler.apply([255, 255, 255]));
        assert_eq!([0, 0, 0], scaler.apply([0, 0, 0]));
    }
}
