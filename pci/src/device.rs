use crate::{ConfigSpace, PciAddress, Result};
use crate::{REG_BAR0, REG_CLASS, REG_COMMAND, REG_DEVICE_ID, REG_HEADER_TYPE, REG_SUBCLASS, REG_VENDOR_ID};

/// Maximum number of base address registers of a function.
pub const BARS_MAX: usize = 6;

const COMMAND_DECODE_MASK: u16 = 0b11;

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum BarKind {
    Memory,
    Io,
}

/// A decoded base address register. Unimplemented registers have a size of zero.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct Bar {
    pub kind: BarKind,
    pub address: u32,
    pub size: u32,
}

impl Bar {
    pub const UNUSED: Bar = Bar { kind: BarKind::Memory, address: 0, size: 0 };

    pub fn is_memory(&self) -> bool {
        self.kind == BarKind::Memory && self.size != 0
    }
}

/// The identification part of a function's configuration header together with its windows.
#[derive(Eq, PartialEq, Clone, Debug)]
pub struct DeviceInfo {
    pub address: PciAddress,
    pub vendor: u16,
    pub device: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub header_type: u8,
    pub bars: [Bar; BARS_MAX],
}

impl DeviceInfo {
    /// Read the header of `dev` and size its base address registers.
    ///
    /// Sizing writes all ones to each register and restores it afterwards, with memory and
    /// I/O decoding switched off in the meantime.
    pub fn read<C: ConfigSpace + ?Sized>(config: &mut C, dev: PciAddress) -> Result<DeviceInfo> {
        let header_type = config.read_u8(dev, REG_HEADER_TYPE)? & 0x7F;
        let mut info = DeviceInfo {
            address: dev,
            vendor: config.read_u16(dev, REG_VENDOR_ID)?,
            device: config.read_u16(dev, REG_DEVICE_ID)?,
            class_code: config.read_u8(dev, REG_CLASS)?,
            subclass: config.read_u8(dev, REG_SUBCLASS)?,
            header_type,
            bars: [Bar::UNUSED; BARS_MAX],
        };

        // bridges only have two, cardbus bridges none
        let bar_count = match header_type {
            0 => 6,
            1 => 2,
            _ => 0,
        };

        let command = config.read_u16(dev, REG_COMMAND)?;
        config.write_u16(dev, REG_COMMAND, command & !COMMAND_DECODE_MASK)?;

        let mut index = 0;
        while index < bar_count {
            let (bar, slots) = size_bar(config, dev, index)?;
            info.bars[index] = bar;
            index += slots;
        }

        config.write_u16(dev, REG_COMMAND, command)?;
        Ok(info)
    }

    /// Iterate over the implemented memory windows.
    pub fn memory_bars(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter().filter(|b| b.is_memory())
    }
}

/// Size the register at `index`, returning the decoded window and the number of
/// register slots it occupies (two for 64 bit memory windows).
fn size_bar<C: ConfigSpace + ?Sized>(config: &mut C, dev: PciAddress, index: usize) -> Result<(Bar, usize)> {
    let reg = REG_BAR0 + (index as u8) * 4;
    let original = config.read_u32(dev, reg)?;
    config.write_u32(dev, reg, 0xFFFF_FFFF)?;
    let decoded = config.read_u32(dev, reg)?;
    config.write_u32(dev, reg, original)?;

    if original & 1 != 0 {
        // I/O window, only the low 16 bits decode on x86
        let mask = (decoded & 0xFFFF_FFFC) | 0xFFFF_0000;
        let size = if decoded & 0xFFFF_FFFC == 0 { 0 } else { (!mask).wrapping_add(1) };
        Ok((Bar { kind: BarKind::Io, address: original & 0xFFFF_FFFC, size }, 1))
    } else {
        let mask = decoded & 0xFFFF_FFF0;
        let size = if mask == 0 { 0 } else { (!mask).wrapping_add(1) };
        let slots = if (original >> 1) & 0b11 == 0b10 { 2 } else { 1 };
        Ok((Bar { kind: BarKind::Memory, address: original & 0xFFFF_FFF0, size }, slots))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::mock::MockBus;

    #[test]
    fn sizes_memory_and_io_windows() {
        let mut bus = MockBus::new();
        let dev = PciAddress::new(1, 0, 0);
        {
            let card = bus.add_device(dev, 0x5333, 0x8A22, 0x03, 0x00);
            card.set_bar(0, 0xE000_0000, 32 * 1024 * 1024);
            card.set_bar(1, 0xD800_0000, 64 * 1024);
            card.set_io_bar(2, 0xD000, 0x100);
        }

        let info = DeviceInfo::read(&mut bus, dev).unwrap();
        assert_eq!(info.vendor, 0x5333);
        assert_eq!(info.class_code, 0x03);
        assert_eq!(info.bars[0], Bar { kind: BarKind::Memory, address: 0xE000_0000, size: 32 * 1024 * 1024 });
        assert_eq!(info.bars[1], Bar { kind: BarKind::Memory, address: 0xD800_0000, size: 64 * 1024 });
        assert_eq!(info.bars[2], Bar { kind: BarKind::Io, address: 0xD000, size: 0x100 });
        assert_eq!(info.bars[3].size, 0);
        assert_eq!(info.memory_bars().count(), 2);
    }

    #[test]
    fn sizing_restores_registers() {
        let mut bus = MockBus::new();
        let dev = PciAddress::new(0, 3, 0);
        {
            let card = bus.add_device(dev, 0x102B, 0x0519, 0x03, 0x00);
            card.set_bar(0, 0xE100_0000, 8 * 1024 * 1024);
            card.set_command(0x0007);
        }

        DeviceInfo::read(&mut bus, dev).unwrap();
        assert_eq!(bus.read_u32(dev, REG_BAR0).unwrap(), 0xE100_0000);
        assert_eq!(bus.read_u16(dev, REG_COMMAND).unwrap(), 0x0007);
    }

    #[test]
    fn bridge_headers_have_two_bars() {
        let mut bus = MockBus::new();
        let dev = PciAddress::new(0, 1, 0);
        {
            let bridge = bus.add_device(dev, 0x10B9, 0x5243, 0x06, 0x04);
            bridge.set_header_type(1);
            bridge.set_bar(4, 0xF000_0000, 1024 * 1024);
        }

        let info = DeviceInfo::read(&mut bus, dev).unwrap();
        assert_eq!(info.memory_bars().count(), 0);
    }
}
