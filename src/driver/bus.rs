use super::DriverError;

#[cfg(feature = "pi")]
use rppal::i2c::I2c;

/// Byte-oriented register bus bound to a single driver chip. The physical bus
/// admits one transaction at a time, so every handle is `&mut self` and there
/// is no internal buffering.
pub trait RegisterBus {
    /// Chip address this handle is bound to.
    fn address(&self) -> u8;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError>;

    fn read_register(&mut self, register: u8) -> Result<u8, DriverError>;
}

/// An I2C handle addressed to one PCA9635 chip.
#[cfg(feature = "pi")]
pub struct I2cBus {
    i2c: I2c,
    address: u8,
}

#[cfg(feature = "pi")]
impl I2cBus {
    /// Open the I2C bus and address the chip. Failure to open the bus device
    /// and failure to reach the chip are reported separately since the first
    /// is a wiring/OS problem and the second is a chip problem.
    pub fn open(bus: u8, address: u8) -> Result<Self, DriverError> {
        let mut i2c = I2c::with_bus(bus).map_err(|e| DriverError::BusUnavailable {
            bus,
            reason: e.to_string(),
        })?;

        i2c.set_slave_address(address as u16)
            .map_err(|e| DriverError::DeviceUnreachable {
                address,
                reason: e.to_string(),
            })?;

        // Probe with a MODE1 read so a missing chip fails here rather than
        // mid-initialization.
        i2c.smbus_read_byte(super::MODE1)
            .map_err(|e| DriverError::DeviceUnreachable {
                address,
                reason: e.to_string(),
            })?;

        Ok(Self { i2c, address })
    }
}

#[cfg(feature = "pi")]
impl RegisterBus for I2cBus {
    fn address(&self) -> u8 {
        self.address
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError> {
        self.i2c
            .write(&[register, value])
            .map_err(|e| DriverError::RegisterWrite {
                address: self.address,
                register,
                reason: e.to_string(),
            })?;
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<u8, DriverError> {
        let mut data = [0u8; 1];
        self.i2c
            .write_read(&[register], &mut data)
            .map_err(|e| DriverError::RegisterRead {
                address: self.address,
                register,
                reason: e.to_string(),
            })?;
        Ok(data[0])
    }
}

/// In-memory register file standing in for a chip when running off the Pi.
/// Writes land in a plain array, which also makes it the test double for
/// everything above the bus seam.
pub struct MemoryBus {
    address: u8,
    registers: [u8; 256],
}

impl MemoryBus {
    pub fn new(address: u8) -> Self {
        Self {
            address,
            registers: [0u8; 256],
        }
    }

    pub fn register(&self, register: u8) -> u8 {
        self.registers[register as usize]
    }
}

impl RegisterBus for MemoryBus {
    fn address(&self) -> u8 {
        self.address
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), DriverError> {
        self.registers[register as usize] = value;
        Ok(())
    }

    fn read_register(&mut self, register: u8) -> Result<u8, DriverError> {
        Ok(self.registers[register as usize])
    }
}
