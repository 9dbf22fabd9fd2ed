use std::path::{Path, PathBuf};

use anyhow::Error;
use log::info;
use serde::{Deserialize, Serialize};

use crate::{
    pixel::{ColorScaler, PixelOutputs},
    trigger::PulseBand,
    TransportCommand,
};

const CONFIG_PATH: &str = "config.ron";

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// I2C bus number the driver chips hang off
    pub i2c_bus: u8,
    /// Chip addresses in driver order; channel map entries index into this
    pub driver_addresses: Vec<u8>,
    /// Directory holding the animation `.bin` files
    pub animation_dir: PathBuf,
    pub frame_interval_ms: u64,
    pub scaler: ColorScaler,
    /// Explicit pixel wiring; when absent the sequential layout across the
    /// configured chips is used
    pub channel_map: Option<Vec<PixelOutputs>>,
    pub trigger: TriggerConfig,
    pub worker: WorkerConfig,
}

#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TriggerConfig {
    pub gpio_pin: u8,
    pub tolerance_us: u32,
    pub cooldown_ms: u64,
    pub bands: Vec<PulseBand>,
}

/// How the trigger daemon launches the playback worker. The wrapper prefixes
/// the command line, which is how the deployment grants the worker realtime
/// scheduling.
#[derive(Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WorkerConfig {
    pub program: PathBuf,
    pub wrapper: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            driver_addresses: vec![0x40, 0x41, 0x42],
            animation_dir: PathBuf::from("bin_files"),
            frame_interval_ms: 30,
            scaler: ColorScaler::default(),
            channel_map: None,
            trigger: TriggerConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            gpio_pin: 18,
            tolerance_us: 10,
            cooldown_ms: 5000,
            bands: vec![
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
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("pixel-show"),
            wrapper: vec!["chrt".to_string(), "-f".to_string(), "99".to_string()],
        }
    }
}

impl Config {
    pub fn load() -> Result<Config, Error> {
        Self::load_from(CONFIG_PATH)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Config, Error> {
        let config = std::fs::read_to_string(path)?;
        let config: Config = ron::from_str(&config)?;
        Ok(config)
    }

    /// Use `config.ron` when present, the built-in deployment defaults
    /// otherwise.
    pub fn load_or_default() -> Result<Config, Error> {
        if Path::new(CONFIG_PATH).exists() {
            Self::load()
        } else {
            info!("no {CONFIG_PATH} found, using built-in defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ron");
        std::fs::write(
            &path,
            r#"(
    i2c_bus: 3,
    driver_addresses: [0x40, 0x41],
    frame_interval_ms: 40,
    scaler: (
        red_ceiling: 200,
        green_ceiling: 255,
        blue_ceiling: 200,
    ),
    trigger: (
        gpio_pin: 12,
        cooldown_ms: 1000,
    ),
)"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(3, config.i2c_bus);
        assert_eq!(vec![0x40, 0x41], config.driver_addresses);
        assert_eq!(40, config.frame_interval_ms);
        assert_eq!(200, config.scaler.red_ceiling);
        assert_eq!(12, config.trigger.gpio_pin);
        assert_eq!(1000, config.trigger.cooldown_ms);
        // Untouched sections keep their defaults
        assert_eq!(WorkerConfig::default(), config.worker);
        assert_eq!(TriggerConfig::default().bands, config.trigger.bands);
    }

    #[test]
    fn test_defaults_describe_the_deployed_rig() {
        let config = Config::default();
        assert_eq!(vec![0x40, 0x41, 0x42], config.driver_addresses);
        assert_eq!(30, config.frame_interval_ms);
        assert!(config.channel_map.is_none());
    }
}
