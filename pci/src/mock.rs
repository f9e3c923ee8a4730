//! An in-memory PCI bus for tests.
//!
//! Base address registers behave like real ones: writing all ones reads back the
//! size mask. Every `write_bytes` call is recorded so tests can check what was
//! programmed, and in which order.

use crate::{check_range, ConfigSpace, PciAddress, Result, CONFIG_SPACE_SIZE};
use crate::{REG_BAR0, REG_CLASS, REG_COMMAND, REG_DEVICE_ID, REG_HEADER_TYPE, REG_SUBCLASS, REG_VENDOR_ID};

pub const MAX_DEVICES: usize = 8;
pub const MAX_WRITES: usize = 64;

/// One recorded configuration write. Only the first 8 bytes of the data are kept.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct WriteRecord {
    pub dev: PciAddress,
    pub offset: u8,
    len: usize,
    data: [u8; 8],
}

impl WriteRecord {
    pub fn data(&self) -> &[u8] {
        &self.data[..self.len.min(8)]
    }
}

#[derive(Clone, Debug)]
pub struct MockDevice {
    address: PciAddress,
    config: [u8; CONFIG_SPACE_SIZE],
    /// Size of each base address register window, zero if unimplemented.
    bar_sizes: [u32; 6],
}

impl MockDevice {
    fn new(address: PciAddress, vendor: u16, device: u16, class_code: u8, subclass: u8) -> MockDevice {
        let mut dev = MockDevice {
            address,
            config: [0; CONFIG_SPACE_SIZE],
            bar_sizes: [0; 6],
        };
        dev.put(REG_VENDOR_ID, &vendor.to_le_bytes());
        dev.put(REG_DEVICE_ID, &device.to_le_bytes());
        dev.config[REG_CLASS as usize] = class_code;
        dev.config[REG_SUBCLASS as usize] = subclass;
        dev
    }

    fn put(&mut self, offset: u8, data: &[u8]) {
        let start = offset as usize;
        self.config[start..start + data.len()].copy_from_slice(data);
    }

    pub fn address(&self) -> PciAddress {
        self.address
    }

    /// Raw configuration space contents.
    pub fn config(&self) -> &[u8; CONFIG_SPACE_SIZE] {
        &self.config
    }

    /// Preload a register without it showing up as a recorded write.
    pub fn set_register(&mut self, offset: u8, data: &[u8]) {
        self.put(offset, data);
    }

    pub fn set_command(&mut self, command: u16) {
        self.put(REG_COMMAND, &command.to_le_bytes());
    }

    pub fn set_header_type(&mut self, header_type: u8) {
        let multifunction = self.config[REG_HEADER_TYPE as usize] & 0x80;
        self.config[REG_HEADER_TYPE as usize] = multifunction | (header_type & 0x7F);
    }

    pub fn set_multifunction(&mut self, multifunction: bool) {
        let reg = &mut self.config[REG_HEADER_TYPE as usize];
        *reg = if multifunction { *reg | 0x80 } else { *reg & 0x7F };
    }

    /// Implement a 32 bit memory window of `size` bytes (a power of two) at `address`.
    pub fn set_bar(&mut self, index: usize, address: u32, size: u32) {
        self.bar_sizes[index] = size;
        self.put(REG_BAR0 + index as u8 * 4, &(address & 0xFFFF_FFF0).to_le_bytes());
    }

    /// Implement an I/O window of `size` bytes (a power of two) at `port`.
    pub fn set_io_bar(&mut self, index: usize, port: u32, size: u32) {
        self.bar_sizes[index] = size;
        self.put(REG_BAR0 + index as u8 * 4, &((port & 0xFFFF_FFFC) | 1).to_le_bytes());
    }

    fn bar_value(&self, index: usize) -> u32 {
        let reg = (REG_BAR0 as usize) + index * 4;
        u32::from_le_bytes([self.config[reg], self.config[reg + 1], self.config[reg + 2], self.config[reg + 3]])
    }

    fn write(&mut self, offset: u8, data: &[u8]) {
        let header_type = self.config[REG_HEADER_TYPE as usize] & 0x7F;
        let old_bars: [u32; 6] = core::array::from_fn(|i| self.bar_value(i));

        self.put(offset, data);

        // base address registers only keep the bits their size allows
        let bar_count = match header_type {
            0 => 6,
            1 => 2,
            _ => 0,
        };
        for index in 0..bar_count {
            let reg = (REG_BAR0 as usize) + index * 4;
            let start = offset as usize;
            if start >= reg + 4 || start + data.len() <= reg {
                continue;
            }
            let size = self.bar_sizes[index];
            let value = if size == 0 {
                0
            } else {
                let flags_mask = if old_bars[index] & 1 != 0 { 0x3 } else { 0xF };
                (self.bar_value(index) & !(size - 1) & !flags_mask) | (old_bars[index] & flags_mask)
            };
            self.put(reg as u8, &value.to_le_bytes());
        }
    }
}

/// A single PCI segment holding up to [`MAX_DEVICES`] functions.
#[derive(Clone, Debug)]
pub struct MockBus {
    accessible: bool,
    devices: [Option<MockDevice>; MAX_DEVICES],
    writes: [Option<WriteRecord>; MAX_WRITES],
    write_count: usize,
}

impl MockBus {
    pub fn new() -> MockBus {
        MockBus {
            accessible: true,
            devices: core::array::from_fn(|_| None),
            writes: [None; MAX_WRITES],
            write_count: 0,
        }
    }

    /// A machine where the configuration mechanism does not respond.
    pub fn inaccessible() -> MockBus {
        MockBus {
            accessible: false,
            ..MockBus::new()
        }
    }

    pub fn add_device(&mut self, address: PciAddress, vendor: u16, device: u16, class_code: u8, subclass: u8) -> &mut MockDevice {
        let slot = self.devices.iter()
            .position(|d| d.as_ref().map_or(true, |d| d.address == address))
            .expect("mock bus is full");
        self.devices[slot] = Some(MockDevice::new(address, vendor, device, class_code, subclass));
        self.devices[slot].as_mut().unwrap()
    }

    pub fn device(&self, address: PciAddress) -> Option<&MockDevice> {
        self.devices.iter().flatten().find(|d| d.address == address)
    }

    pub fn device_mut(&mut self, address: PciAddress) -> Option<&mut MockDevice> {
        self.devices.iter_mut().flatten().find(|d| d.address == address)
    }

    /// Total number of `write_bytes` calls, including those past [`MAX_WRITES`].
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// The recorded writes in the order they were issued.
    pub fn writes(&self) -> impl Iterator<Item = &WriteRecord> {
        self.writes.iter().flatten()
    }

    /// The recorded writes that went to `dev`.
    pub fn writes_to(&self, dev: PciAddress) -> impl Iterator<Item = &WriteRecord> {
        self.writes().filter(move |w| w.dev == dev)
    }

    /// Forget all recorded writes.
    pub fn clear_writes(&mut self) {
        self.writes = [None; MAX_WRITES];
        self.write_count = 0;
    }
}

impl Default for MockBus {
    fn default() -> MockBus {
        MockBus::new()
    }
}

impl ConfigSpace for MockBus {
    fn is_accessible(&mut self) -> bool {
        self.accessible
    }

    fn read_bytes(&mut self, dev: PciAddress, offset: u8, buf: &mut [u8]) -> Result<()> {
        check_range(offset, buf.len())?;
        match self.device(dev) {
            Some(d) => buf.copy_from_slice(&d.config[offset as usize..offset as usize + buf.len()]),
            None => buf.iter_mut().for_each(|b| *b = 0xFF),
        }
        Ok(())
    }

    fn write_bytes(&mut self, dev: PciAddress, offset: u8, data: &[u8]) -> Result<()> {
        check_range(offset, data.len())?;
        if let Some(record) = self.writes.get_mut(self.write_count) {
            let mut copy = [0_u8; 8];
            let len = data.len().min(8);
            copy[..len].copy_from_slice(&data[..len]);
            *record = Some(WriteRecord { dev, offset, len: data.len(), data: copy });
        }
        self.write_count += 1;

        if let Some(d) = self.device_mut(dev) {
            d.write(offset, data);
        }
        Ok(())
    }
}
