//! SiS host bridges with a fast back-to-back frame buffer area.

use bare_metal::Bits;
use k6::{MemoryTypeRange, MtrrSet};
use pci::{ConfigSpace, PciAddress};

use crate::size::{SizeClass, SizeLimits};
use crate::{select_region, ChipsetEncoder, Result};

pub const VENDOR_SIS: u16 = 0x1039;

/// The size mask covers 1 MiB up to the full 4 GiB.
const SIZE_LIMITS: SizeLimits = SizeLimits { max_class: 12, official_max_class: 12 };

const SIS559X_REG_CPU_PCI: u8 = 0x82;
const SIS559X_REG_FB_BASE: u8 = 0x88;
const SIS559X_REG_FB_SIZE: u8 = 0x8A;
const SIS530_REG_PREFETCH_BASE: u8 = 0x22;
const SIS530_REG_PREFETCH_LIMIT: u8 = 0x24;

bitflags! {
    /// The bits we touch in register 82h, CPU to PCI characteristics.
    pub struct CpuPciCharacteristics : u8 {
        const FB_FAST_BACK_TO_BACK = 1 << 4;
    }
}

/// Address bits 31-20 in bits 4-15, bits 0-3 reserved.
fn address_register(address: u32) -> u16 {
    let mut reg = 0_u16;
    reg.set_bits(4..=15, (address >> 20) as u16);
    reg
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct Sis559xImage {
    pub base: u16,
    /// One mask bit per megabyte doubling outside the region, all set for 1 MiB.
    pub size: u16,
}

pub fn sis559x_image(range: &MemoryTypeRange) -> Sis559xImage {
    let class = SizeClass::for_size(range.size_kb, SIZE_LIMITS).logged();
    let mask = (0xFFF_u32 << class) & 0xFFF;
    let mut size = 0_u16;
    size.set_bits(4..=15, mask as u16);
    Sis559xImage { base: address_register(range.offset), size }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct Sis530Image {
    pub base: u16,
    /// The last megabyte belonging to the region.
    pub limit: u16,
}

/// The limit is the last megabyte of the region, the way bridge windows are decoded.
/// Some setup tools program the megabyte after the region instead, which makes the
/// window one megabyte too large.
pub fn sis530_image(range: &MemoryTypeRange) -> Sis530Image {
    let last = range.offset as u64 + range.size_kb as u64 * 1024 - 1;
    Sis530Image {
        base: address_register(range.offset),
        limit: address_register(last.min(u32::MAX as u64) as u32),
    }
}

/// SiS 5571, 5581/5582 and 5591/5592.
#[derive(Debug)]
pub struct Sis559x;

impl ChipsetEncoder for Sis559x {
    fn encode(&self, config: &mut dyn ConfigSpace, dev: PciAddress, mtrr: &MtrrSet) -> Result<Option<MemoryTypeRange>> {
        let range = match select_region(mtrr) {
            Some(range) => *range,
            None => return Ok(None),
        };
        let image = sis559x_image(&range);

        // the other characteristics must be kept
        let cpu_pci = config.read_u8(dev, SIS559X_REG_CPU_PCI)? | CpuPciCharacteristics::FB_FAST_BACK_TO_BACK.bits();

        trace!("[chipset] {}: base {:#06x}, size {:#06x}, characteristics {:#04x}", dev, image.base, image.size, cpu_pci);
        config.write_u16(dev, SIS559X_REG_FB_BASE, image.base)?;
        config.write_u16(dev, SIS559X_REG_FB_SIZE, image.size)?;
        config.write_bytes(dev, SIS559X_REG_CPU_PCI, &[cpu_pci])?;
        Ok(Some(range))
    }
}

/// SiS 530 and 540, using the prefetchable memory window of the integrated bridge.
#[derive(Debug)]
pub struct Sis530;

impl ChipsetEncoder for Sis530 {
    fn encode(&self, config: &mut dyn ConfigSpace, dev: PciAddress, mtrr: &MtrrSet) -> Result<Option<MemoryTypeRange>> {
        let range = match select_region(mtrr) {
            Some(range) => *range,
            None => return Ok(None),
        };
        let image = sis530_image(&range);

        trace!("[chipset] {}: base {:#06x}, limit {:#06x}", dev, image.base, image.limit);
        config.write_u16(dev, SIS530_REG_PREFETCH_BASE, image.base)?;
        config.write_u16(dev, SIS530_REG_PREFETCH_LIMIT, image.limit)?;
        Ok(Some(range))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sis559x_size_mask() {
        let mask = |size_kb| sis559x_image(&MemoryTypeRange::new(0xE000_0000, size_kb, true, false)).size;
        assert_eq!(mask(1024), 0xFFF0);
        assert_eq!(mask(2048), 0xFFE0);
        assert_eq!(mask(8192), 0xFF80);
        assert_eq!(mask(4 * 1024 * 1024), 0x0000);
    }

    #[test]
    fn sis559x_base() {
        let image = sis559x_image(&MemoryTypeRange::new(0xD800_0000, 4096, true, false));
        assert_eq!(image.base, 0xD800);
    }

    #[test]
    fn sis530_window() {
        let image = sis530_image(&MemoryTypeRange::new(0xE000_0000, 8192, true, false));
        assert_eq!(image, Sis530Image { base: 0xE000, limit: 0xE070 });

        let image = sis530_image(&MemoryTypeRange::new(0xF000_0000, 256 * 1024, true, false));
        assert_eq!(image, Sis530Image { base: 0xF000, limit: 0xFFF0 });
    }
}
