//! ALi Aladdin III, IV and V: the host bridge can burst CPU writes to one
//! programmable frame buffer region.
//!
//! The Aladdin V also has the region registers in its AGP bridge, which has to be
//! programmed identically.

use bare_metal::Bits;
use k6::{MemoryTypeRange, MtrrSet};
use pci::{ConfigSpace, PciAddress};

use crate::size::{SizeClass, SizeLimits};
use crate::{select_region, ChipsetEncoder, ChipsetError, Result};

pub const VENDOR_ALI: u16 = 0x10B9;
pub const DEVICE_ALADDIN_5_AGP: u16 = 0x5243;

/// Officially 16 MiB, but the register has room for 128 MiB.
const SIZE_LIMITS: SizeLimits = SizeLimits { max_class: 7, official_max_class: 4 };

const ALADDIN34_REG_FB_REGION: u8 = 0x54;
const ALADDIN34_REG_WRITE_BUFFER: u8 = 0x56;
const ALADDIN5_REG_FB_REGION: u8 = 0x84;
const ALADDIN5_REG_WRITE_BUFFER: u8 = 0x86;

bitflags! {
    /// Register 56h of the Aladdin III/IV, CPU to PCI write buffer option.
    pub struct Aladdin34WriteBuffer : u8 {
        const FB_ENABLE         = 1 << 0;
        const VGA_FB_ENABLE     = 1 << 1;
        const PCI_WRITE_BURST   = 1 << 2;
        const FAST_BACK_TO_BACK = 1 << 3;
        const FB_BYTE_MERGE     = 1 << 4;
        const FB_WORD_MERGE     = 1 << 5;
        const FB_LINEAR_MERGE   = 1 << 6;
        const ALL_PCI_MEMORY    = 1 << 7;
    }
}

bitflags! {
    /// Register 86h of the Aladdin V, CPU to PCI write buffer option. Bits 4-7 are reserved.
    pub struct Aladdin5WriteBuffer : u8 {
        const FB_ENABLE       = 1 << 0;
        const VGA_FB_ENABLE   = 1 << 1;
        const FB_WRITE_BURST  = 1 << 2;
        const FB_LINEAR_MERGE = 1 << 3;
    }
}

/// Contents of the frame buffer region and write buffer option registers.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct AliImage {
    pub region: u16,
    pub write_buffer: u8,
}

/// The region register: size class in bits 0-2, address bits 31-20 in bits 4-15.
/// Bit 3 is reserved on the III/IV and the "all PCI memory" switch on the V; both stay clear.
fn region_register(range: &MemoryTypeRange) -> u16 {
    let class = SizeClass::for_size(range.size_kb, SIZE_LIMITS).logged();
    let mut region = 0_u16;
    region.set_bits(0..=2, class as u16);
    region.set_bit(3, false);
    region.set_bits(4..=15, (range.offset >> 20) as u16);
    region
}

pub fn aladdin34_image(range: &MemoryTypeRange, vga: bool) -> AliImage {
    let mut flags = Aladdin34WriteBuffer::FB_ENABLE
        | Aladdin34WriteBuffer::PCI_WRITE_BURST
        | Aladdin34WriteBuffer::FAST_BACK_TO_BACK
        | Aladdin34WriteBuffer::FB_BYTE_MERGE
        | Aladdin34WriteBuffer::FB_WORD_MERGE;
    flags.set(Aladdin34WriteBuffer::VGA_FB_ENABLE, vga);
    AliImage { region: region_register(range), write_buffer: flags.bits() }
}

pub fn aladdin5_image(range: &MemoryTypeRange, vga: bool) -> AliImage {
    let mut flags = Aladdin5WriteBuffer::FB_ENABLE | Aladdin5WriteBuffer::FB_WRITE_BURST;
    flags.set(Aladdin5WriteBuffer::VGA_FB_ENABLE, vga);
    AliImage { region: region_register(range), write_buffer: flags.bits() }
}

fn write_image(config: &mut dyn ConfigSpace, dev: PciAddress, region_reg: u8, buffer_reg: u8, image: &AliImage) -> Result<()> {
    trace!("[chipset] {}: region {:#06x}, write buffer {:#04x}", dev, image.region, image.write_buffer);
    config.write_u16(dev, region_reg, image.region)?;
    config.write_bytes(dev, buffer_reg, &[image.write_buffer])?;
    Ok(())
}

/// Aladdin III (M1521) and IV (M1531).
#[derive(Debug)]
pub struct Aladdin34;

impl ChipsetEncoder for Aladdin34 {
    fn encode(&self, config: &mut dyn ConfigSpace, dev: PciAddress, mtrr: &MtrrSet) -> Result<Option<MemoryTypeRange>> {
        let range = match select_region(mtrr) {
            Some(range) => *range,
            None => return Ok(None),
        };
        let image = aladdin34_image(&range, mtrr.is_vga_write_combine_requested());
        write_image(config, dev, ALADDIN34_REG_FB_REGION, ALADDIN34_REG_WRITE_BUFFER, &image)?;
        Ok(Some(range))
    }
}

/// Aladdin V (M1541) together with its AGP bridge (M5243).
#[derive(Debug)]
pub struct Aladdin5;

impl ChipsetEncoder for Aladdin5 {
    fn encode(&self, config: &mut dyn ConfigSpace, dev: PciAddress, mtrr: &MtrrSet) -> Result<Option<MemoryTypeRange>> {
        let range = match select_region(mtrr) {
            Some(range) => *range,
            None => return Ok(None),
        };

        let agp = pci::find_device_by_id(config, VENDOR_ALI, DEVICE_ALADDIN_5_AGP)?
            .ok_or(ChipsetError::MissingCompanion { vendor: VENDOR_ALI, device: DEVICE_ALADDIN_5_AGP })?;

        let image = aladdin5_image(&range, mtrr.is_vga_write_combine_requested());
        write_image(config, dev, ALADDIN5_REG_FB_REGION, ALADDIN5_REG_WRITE_BUFFER, &image)?;
        write_image(config, agp, ALADDIN5_REG_FB_REGION, ALADDIN5_REG_WRITE_BUFFER, &image)?;
        Ok(Some(range))
    }
}
