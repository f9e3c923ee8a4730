//! Access to the PCI configuration space.
//!
//! Everything that needs to look at or program PCI devices goes through the
//! [`ConfigSpace`] trait. [`port::PortConfigSpace`] implements it on real hardware
//! using configuration mechanism #1, the tests use the in-memory `mock` bus.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

mod device;
pub mod port;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use self::device::*;

use core::fmt;
use thiserror::Error;

/// Base class of display controllers.
pub const CLASS_DISPLAY: u8 = 0x03;
/// Display controller subclass of VGA compatible devices.
pub const SUBCLASS_VGA: u8 = 0x00;

/// Size of the configuration space of a conventional PCI function.
pub const CONFIG_SPACE_SIZE: usize = 256;

pub const REG_VENDOR_ID: u8 = 0x00;
pub const REG_DEVICE_ID: u8 = 0x02;
pub const REG_COMMAND: u8 = 0x04;
pub const REG_PROG_IF: u8 = 0x09;
pub const REG_SUBCLASS: u8 = 0x0A;
pub const REG_CLASS: u8 = 0x0B;
pub const REG_HEADER_TYPE: u8 = 0x0E;
pub const REG_BAR0: u8 = 0x10;

const VENDOR_NONE: u16 = 0xFFFF;
const HEADER_MULTIFUNCTION: u8 = 0x80;

pub type Result<T> = core::result::Result<T, PciError>;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PciError {
    #[error("configuration access at {offset:#04x}+{len} exceeds the configuration space")]
    OutOfRange { offset: u8, len: usize },
}

/// Geographical address of a PCI function.
#[derive(Eq, PartialEq, Ord, PartialOrd, Copy, Clone, Debug, Hash)]
pub struct PciAddress {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciAddress {
    pub const MAX_DEVICE: u8 = 31;
    pub const MAX_FUNCTION: u8 = 7;

    pub const fn new(bus: u8, device: u8, function: u8) -> PciAddress {
        PciAddress { bus, device, function }
    }

    /// Function 0 of the next slot, or `None` after the last slot of bus 255.
    fn next_slot(&self) -> Option<PciAddress> {
        if self.device < Self::MAX_DEVICE {
            Some(PciAddress::new(self.bus, self.device + 1, 0))
        } else if self.bus < u8::MAX {
            Some(PciAddress::new(self.bus + 1, 0, 0))
        } else {
            None
        }
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// Byte granular access to the configuration space of PCI functions.
pub trait ConfigSpace {
    /// Whether the configuration mechanism works on this machine at all.
    fn is_accessible(&mut self) -> bool;

    /// Read `buf.len()` bytes starting at `offset`.
    fn read_bytes(&mut self, dev: PciAddress, offset: u8, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `offset`. Writes are not read back.
    fn write_bytes(&mut self, dev: PciAddress, offset: u8, data: &[u8]) -> Result<()>;

    fn read_u8(&mut self, dev: PciAddress, offset: u8) -> Result<u8> {
        let mut buf = [0_u8; 1];
        self.read_bytes(dev, offset, &mut buf)?;
        Ok(buf[0])
    }

    fn read_u16(&mut self, dev: PciAddress, offset: u8) -> Result<u16> {
        let mut buf = [0_u8; 2];
        self.read_bytes(dev, offset, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&mut self, dev: PciAddress, offset: u8) -> Result<u32> {
        let mut buf = [0_u8; 4];
        self.read_bytes(dev, offset, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn write_u16(&mut self, dev: PciAddress, offset: u8, value: u16) -> Result<()> {
        self.write_bytes(dev, offset, &value.to_le_bytes())
    }

    fn write_u32(&mut self, dev: PciAddress, offset: u8, value: u32) -> Result<()> {
        self.write_bytes(dev, offset, &value.to_le_bytes())
    }
}

/// Reject accesses running past the end of the configuration space.
pub fn check_range(offset: u8, len: usize) -> Result<()> {
    if offset as usize + len > CONFIG_SPACE_SIZE {
        Err(PciError::OutOfRange { offset, len })
    } else {
        Ok(())
    }
}

/// Whether a function responds at `dev`.
pub fn is_present<C: ConfigSpace + ?Sized>(config: &mut C, dev: PciAddress) -> Result<bool> {
    Ok(config.read_u16(dev, REG_VENDOR_ID)? != VENDOR_NONE)
}

/// The address to look at after `dev`. Functions 1-7 only exist on multi-function devices.
fn next_candidate<C: ConfigSpace + ?Sized>(config: &mut C, dev: PciAddress) -> Result<Option<PciAddress>> {
    if dev.function == 0 {
        let slot_populated = is_present(config, dev)?;
        let multifunction = slot_populated
            && config.read_u8(dev, REG_HEADER_TYPE)? & HEADER_MULTIFUNCTION != 0;
        if !multifunction {
            return Ok(dev.next_slot());
        }
    }
    if dev.function < PciAddress::MAX_FUNCTION {
        Ok(Some(PciAddress::new(dev.bus, dev.device, dev.function + 1)))
    } else {
        Ok(dev.next_slot())
    }
}

/// Return the first function present after `after`, or the very first one if `after` is `None`.
///
/// Enumeration is cursor based so the caller keeps full access to `config` between steps:
///
/// ```ignore
/// let mut cursor = None;
/// while let Some(dev) = pci::next_device(&mut config, cursor)? {
///     cursor = Some(dev);
/// }
/// ```
pub fn next_device<C: ConfigSpace + ?Sized>(config: &mut C, after: Option<PciAddress>) -> Result<Option<PciAddress>> {
    let mut candidate = match after {
        None => Some(PciAddress::new(0, 0, 0)),
        Some(dev) => next_candidate(config, dev)?,
    };

    while let Some(dev) = candidate {
        if is_present(config, dev)? {
            return Ok(Some(dev));
        }
        candidate = next_candidate(config, dev)?;
    }
    Ok(None)
}

/// Find the first function with the given vendor and device IDs.
pub fn find_device_by_id<C: ConfigSpace + ?Sized>(config: &mut C, vendor: u16, device: u16) -> Result<Option<PciAddress>> {
    let mut cursor = None;
    while let Some(dev) = next_device(config, cursor)? {
        if config.read_u16(dev, REG_VENDOR_ID)? == vendor && config.read_u16(dev, REG_DEVICE_ID)? == device {
            trace!("[pci] {:04x}:{:04x} found at {}", vendor, device, dev);
            return Ok(Some(dev));
        }
        cursor = Some(dev);
    }
    Ok(None)
}

#[cfg(test)]
mod test {
    use super::*;
    use super::mock::MockBus;

    #[test]
    fn enumerates_in_bus_order() {
        let mut bus = MockBus::new();
        bus.add_device(PciAddress::new(1, 0, 0), 0x1002, 0x4742, 0x03, 0x00);
        bus.add_device(PciAddress::new(0, 0, 0), 0x10B9, 0x1541, 0x06, 0x00);
        bus.add_device(PciAddress::new(0, 1, 0), 0x10B9, 0x5243, 0x06, 0x04);

        let mut found = Vec::new();
        let mut cursor = None;
        while let Some(dev) = next_device(&mut bus, cursor).unwrap() {
            found.push(dev);
            cursor = Some(dev);
        }
        assert_eq!(found, vec![
            PciAddress::new(0, 0, 0),
            PciAddress::new(0, 1, 0),
            PciAddress::new(1, 0, 0),
        ]);
    }

    #[test]
    fn functions_only_scanned_on_multifunction_devices() {
        let mut bus = MockBus::new();
        bus.add_device(PciAddress::new(0, 7, 0), 0x1039, 0x0008, 0x06, 0x01);
        // not reachable: function 0 does not announce more functions
        bus.add_device(PciAddress::new(0, 7, 1), 0x1039, 0x5513, 0x01, 0x01);

        assert_eq!(next_device(&mut bus, None).unwrap(), Some(PciAddress::new(0, 7, 0)));
        assert_eq!(next_device(&mut bus, Some(PciAddress::new(0, 7, 0))).unwrap(), None);

        bus.device_mut(PciAddress::new(0, 7, 0)).unwrap().set_multifunction(true);
        assert_eq!(next_device(&mut bus, Some(PciAddress::new(0, 7, 0))).unwrap(), Some(PciAddress::new(0, 7, 1)));
    }

    #[test]
    fn find_by_id() {
        let mut bus = MockBus::new();
        bus.add_device(PciAddress::new(0, 0, 0), 0x1039, 0x5591, 0x06, 0x00);
        bus.add_device(PciAddress::new(0, 2, 0), 0x1039, 0x0001, 0x06, 0x04);

        assert_eq!(find_device_by_id(&mut bus, 0x1039, 0x0001).unwrap(), Some(PciAddress::new(0, 2, 0)));
        assert_eq!(find_device_by_id(&mut bus, 0x10B9, 0x5243).unwrap(), None);
    }

    #[test]
    fn out_of_range_access() {
        let mut bus = MockBus::new();
        let dev = PciAddress::new(0, 0, 0);
        bus.add_device(dev, 0x10B9, 0x1521, 0x06, 0x00);
        assert_eq!(bus.read_u32(dev, 0xFE), Err(PciError::OutOfRange { offset: 0xFE, len: 4 }));
        assert!(bus.read_u16(dev, 0xFE).is_ok());
    }

    #[test]
    fn address_display() {
        assert_eq!(format!("{}", PciAddress::new(1, 0x1f, 3)), "01:1f.3");
    }
}
