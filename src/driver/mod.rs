use std::time::Duration;

use log::debug;
use thiserror::Error;

pub mod bus;
pub mod pack;

pub use bus::{MemoryBus, RegisterBus};

#[cfg(feature = "pi")]
pub use bus::I2cBus;

use pack::LedOutPack;

// Register map
pub const MODE1: u8 = 0x00;
pub const MODE2: u8 = 0x01;
pub const PWM0: u8 = 0x02;
pub const PWM15: u8 = 0x11;
pub const GRPPWM: u8 = 0x12;
pub const GRPFREQ: u8 = 0x13;
pub const LEDOUT0: u8 = 0x14;
pub const LEDOUT3: u8 = 0x17;

// MODE2: totem pole output drivers
pub const MODE2_OUTDRV: u8 = 0x04;

pub const CHANNELS_PER_CHIP: u8 = 16;

// Oscillator settle time after leaving sleep mode, datasheet minimum
const STABILIZE: Duration = Duration::from_micros(500);

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("I2C bus {bus} unavailable: {reason}")]
    BusUnavailable { bus: u8, reason: String },
    #[error("no response from driver chip at 0x{address:02X}: {reason}")]
    DeviceUnreachable { address: u8, reason: String },
    #[error("write of register 0x{register:02X} on chip 0x{address:02X} failed: {reason}")]
    RegisterWrite {
        address: u8,
        register: u8,
        reason: String,
    },
    #[error("read of register 0x{register:02X} on chip 0x{address:02X} failed: {reason}")]
    RegisterRead {
        address: u8,
        register: u8,
        reason: String,
    },
    #[error("register packing failed: {0}")]
    Packing(#[from] packed_struct::PackingError),
}

/// The four output states a channel can be in, as encoded in the LEDOUT
/// registers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelState {
    Off = 0b00,
    On = 0b01,
    /// Controlled by the channel's own PWM duty register
    Pwm = 0b10,
    /// Controlled by the channel's duty register and the group duty register
    Group = 0b11,
}

/// One PCA9635 16-channel PWM driver chip. Hardware state is authoritative;
/// the only read this type performs is the read-modify-write of the packed
/// LEDOUT fields.
pub struct Pca9635<B> {
    bus: B,
}

impl<B: RegisterBus> Pca9635<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn address(&self) -> u8 {
        self.bus.address()
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Bring the chip into a known dark state: normal (non-sleep) mode,
    /// totem-pole outputs, every channel off with zero duty, default group
    /// blink configuration. Any failed write aborts and is fatal for this
    /// chip.
    pub fn initialize(&mut self) -> Result<(), DriverError> {
        debug!("initializing driver chip 0x{:02X}", self.address());

        self.write_register(MODE1, 0x00)?;
        std::thread::sleep(STABILIZE);

        self.write_register(MODE2, MODE2_OUTDRV)?;

        for register in LEDOUT0..=LEDOUT3 {
            self.write_register(register, 0x00)?;
        }

        for register in PWM0..=PWM15 {
            self.write_register(register, 0x00)?;
        }

        self.write_register(GRPPWM, 0xFF)?;
        self.write_register(GRPFREQ, 0x00)?;

        Ok(())
    }

    pub fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError> {
        self.bus.write_register(register, value)
    }

    pub fn read_register(&mut self, register: u8) -> Result<u8, DriverError> {
        self.bus.read_register(register)
    }

    /// Rewrite the 2-bit state field for one channel, leaving the other three
    /// channels that share the register untouched.
    pub fn set_channel_state(&mut self, channel: u8, state: ChannelState) -> Result<(), DriverError> {
        debug_assert!(channel < CHANNELS_PER_CHIP);

        let register = LEDOUT0 + channel / 4;
        let mut fields = LedOutPack::from_register(self.read_register(register)?)?;
        fields.set_slot(channel % 4, state);
        self.write_register(register, fields.to_register()?)
    }

    /// Set a channel's PWM duty. The channel is moved under PWM control
    /// first, since a duty write has no visible effect in the OFF/ON states.
    pub fn set_channel_brightness(&mut self, channel: u8, duty: u8) -> Result<(), DriverError> {
        debug_assert!(channel < CHANNELS_PER_CHIP);

        self.set_channel_state(channel, ChannelState::Pwm)?;
        self.write_register(PWM0 + channel, duty)
    }

    pub fn set_group_brightness(&mut self, duty: u8) -> Result<(), DriverError> {
        self.write_register(GRPPWM, duty)
    }

    pub fn set_group_frequency(&mut self, frequency: u8) -> Result<(), DriverError> {
        self.write_register(GRPFREQ, frequency)
    }
}

#[cfg(feature = "pi")]
impl Pca9635<I2cBus> {
    /// Open the bus and address one chip.
    pub fn connect(bus: u8, address: u8) -> Result<Self, DriverError> {
        Ok(Self::new(I2cBus::open(bus, address)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialize_sequence() {
        let mut chip = Pca9635::new(MemoryBus::new(0x40));
        chip.initialize().unwrap();

        assert_eq!(0x00, chip.bus().register(MODE1));
        assert_eq!(MODE2_OUTDRV, chip.bus().register(MODE2));
        for register in LEDOUT0..=LEDOUT3 {
            assert_eq!(0x00, chip.bus().register(register));
        }
        for register in PWM0..=PWM15 {
            assert_eq!(0x00, chip.bus().register(register));
        }
        assert_eq!(0xFF, chip.bus().register(GRPPWM));
        assert_eq!(0x00, chip.bus().register(GRPFREQ));
    }

    #[test]
    fn test_channel_state_read_modify_write() {
        let mut chip = Pca9635::new(MemoryBus::new(0x40));

        // Channels 4..8 live in LEDOUT1; preset their neighbours
        chip.write_register(LEDOUT0 + 1, 0b1100_0111).unwrap();

        chip.set_channel_state(5, ChannelState::Pwm).unwrap();

        // Only bits 3:2 (channel 5) may change
        assert_eq!(0b1100_1011, chip.bus().register(LEDOUT0 + 1));
    }

    #[test]
    fn test_brightness_moves_channel_under_pwm() {
        let mut chip = Pca9635::new(MemoryBus::new(0x41));
        chip.initialize().unwrap();

        chip.set_channel_brightness(14, 0x7F).unwrap();

        assert_eq!(0x7F, chip.bus().register(PWM0 + 14));
        // Channel 14 sits in LEDOUT3 bits 5:4
        assert_eq!(0b0010_0000, chip.bus().register(LEDOUT3));
    }
}
