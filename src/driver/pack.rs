use packed_struct::{prelude::*, types::bits::Bits};

use super::ChannelState;

// LEDOUT State Register (8-bit Packet):
// Bits   | Definition
// 0x03   | Output state, channel 4n
// 0x0C   | Output state, channel 4n+1
// 0x30   | Output state, channel 4n+2
// 0xC0   | Output state, channel 4n+3
//
// Each LEDOUT register carries the 2-bit output state of four consecutive
// channels, so changing one channel requires a read-modify-write that keeps
// the other three fields intact.
#[derive(PackedStruct, Default, Debug, PartialEq, Clone, Copy)]
#[packed_struct(bit_numbering = "msb0", size = "1")]
pub struct LedOutPack {
    #[packed_field(bits = "0..=1")]
    pub slot3: Integer<u8, Bits<2>>,
    #[packed_field(bits = "2..=3")]
    pub slot2: Integer<u8, Bits<2>>,
    #[packed_field(bits = "4..=5")]
    pub slot1: Integer<u8, Bits<2>>,
    #[packed_field(bits = "6..=7")]
    pub slot0: Integer<u8, Bits<2>>,
}

impl LedOutPack {
    pub fn from_register(value: u8) -> Result<Self, PackingError> {
        Self::unpack(&[value])
    }

    pub fn to_register(&self) -> Result<u8, PackingError> {
        Ok(self.pack()?[0])
    }

    /// Replace the state of one of the four channels in this register.
    pub fn set_slot(&mut self, slot: u8, state: ChannelState) {
        let state = (state as u8).into();
        match slot {
            0 => self.slot0 = state,
            1 => self.slot1 = state,
            2 => self.slot2 = state,
            _ => self.slot3 = state,
        }
    }

    pub fn slot(&self, slot: u8) -> u8 {
        match slot {
            0 => *self.slot0,
            1 => *self.slot1,
            2 => *self.slot2,
            _ => *self.slot3,
        }
    }
}
