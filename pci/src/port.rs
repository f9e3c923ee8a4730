//! PCI configuration mechanism #1: an address register at 0xCF8 selects a dword of
//! configuration space which is then accessed through the data register at 0xCFC.

use bare_metal::cpu::io::{self, PortNumber};

use crate::{check_range, ConfigSpace, PciAddress, Result};

pub const CONFIG_ADDRESS: PortNumber = PortNumber(0x0CF8);
pub const CONFIG_DATA: PortNumber = PortNumber(0x0CFC);

const ENABLE: u32 = 0x8000_0000;

/// The address/data register pair must be used as one unit.
pub static CONFIG_LOCK: spin::Mutex<()> = spin::Mutex::new(());

/// [`ConfigSpace`] over the configuration mechanism #1 I/O ports.
#[derive(Debug)]
pub struct PortConfigSpace(());

impl PortConfigSpace {
    /// The caller must ensure that port I/O is permitted and that nothing else
    /// accesses the configuration ports concurrently without taking [`CONFIG_LOCK`].
    pub const unsafe fn new() -> PortConfigSpace {
        PortConfigSpace(())
    }

    fn config_address(dev: PciAddress, offset: u8) -> u32 {
        ENABLE
            | ((dev.bus as u32) << 16)
            | ((dev.device as u32 & 0x1F) << 11)
            | ((dev.function as u32 & 0x07) << 8)
            | (offset as u32 & 0xFC)
    }

    unsafe fn read_dword(dev: PciAddress, offset: u8) -> u32 {
        io::outl(CONFIG_ADDRESS, Self::config_address(dev, offset));
        io::inl(CONFIG_DATA)
    }

    /// Write one naturally aligned register of `data.len()` bytes. Narrow writes go to
    /// the matching byte lanes of the data port so the rest of the dword is untouched.
    unsafe fn write_register(dev: PciAddress, offset: u8, data: &[u8]) {
        io::outl(CONFIG_ADDRESS, Self::config_address(dev, offset));
        let port = CONFIG_DATA + (offset & 3) as u16;
        match *data {
            [a, b, c, d] => io::outl(port, u32::from_le_bytes([a, b, c, d])),
            [lo, hi] => io::outw(port, u16::from_le_bytes([lo, hi])),
            [byte] => io::outb(port, byte),
            _ => unreachable!("config space access of {} bytes", data.len()),
        }
    }
}

/// Split `len` bytes at `offset` into the widest naturally aligned accesses, as
/// `(offset, width)`.
fn accesses(offset: usize, len: usize) -> impl Iterator<Item = (usize, usize)> {
    let end = offset + len;
    let mut reg = offset;
    core::iter::from_fn(move || {
        let remaining = end.checked_sub(reg).filter(|&r| r > 0)?;
        let width = if reg % 4 == 0 && remaining >= 4 {
            4
        } else if reg % 2 == 0 && remaining >= 2 {
            2
        } else {
            1
        };
        let access = (reg, width);
        reg += width;
        Some(access)
    })
}

impl ConfigSpace for PortConfigSpace {
    fn is_accessible(&mut self) -> bool {
        let _lock = CONFIG_LOCK.lock();
        unsafe {
            let saved = io::inl(CONFIG_ADDRESS);
            io::outl(CONFIG_ADDRESS, ENABLE);
            let readback = io::inl(CONFIG_ADDRESS);
            io::outl(CONFIG_ADDRESS, saved);
            readback == ENABLE
        }
    }

    fn read_bytes(&mut self, dev: PciAddress, offset: u8, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len())?;
        let _lock = CONFIG_LOCK.lock();
        for (i, byte) in buf.iter_mut().enumerate() {
            let reg = offset as usize + i;
            let dword = unsafe { Self::read_dword(dev, reg as u8) };
            *byte = (dword >> ((reg & 3) * 8)) as u8;
        }
        Ok(())
    }

    fn write_bytes(&mut self, dev: PciAddress, offset: u8, data: &[u8]) -> Result<()> {
        check_range(offset, data.len())?;
        let _lock = CONFIG_LOCK.lock();

        for (reg, width) in accesses(offset as usize, data.len()) {
            let at = reg - offset as usize;
            unsafe { Self::write_register(dev, reg as u8, &data[at..at + width]) };
        }
        Ok(())
    }
}
