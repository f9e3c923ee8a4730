//! Frame buffer write acceleration in the host bridge.
//!
//! Some chipsets of the K6 era can burst or merge CPU writes to one programmable
//! frame buffer region. Once the memory type ranges are settled, [`auto_configure`]
//! looks for a known host bridge and mirrors the first write combining range into it.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate log;

pub mod ali;
pub mod sis;
pub mod size;

use core::fmt;

use k6::{MemoryTypeRange, MtrrSet, SysInfo};
use pci::{ConfigSpace, PciAddress, PciError};
use thiserror::Error;

/// Chipsets only decode the frame buffer region in 1 MiB steps.
pub const REGION_ALIGNMENT_MASK: u32 = 0xF_FFFF;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipsetError {
    #[error("PCI access failed: {0}")]
    Pci(#[from] PciError),
    #[error("companion bridge {vendor:04x}:{device:04x} not found")]
    MissingCompanion { vendor: u16, device: u16 },
}

pub type Result<T> = core::result::Result<T, ChipsetError>;

/// Programs the frame buffer registers of one chipset family.
pub trait ChipsetEncoder: Sync {
    /// Program the bridge at `dev` for the ranges in `mtrr`. Returns the range that was
    /// programmed, `None` if there was no suitable one.
    fn encode(&self, config: &mut dyn ConfigSpace, dev: PciAddress, mtrr: &MtrrSet) -> Result<Option<MemoryTypeRange>>;
}

/// A host bridge we know how to program.
pub struct ChipsetDescriptor {
    pub vendor: u16,
    pub device: u16,
    pub name: &'static str,
    pub encoder: &'static dyn ChipsetEncoder,
}

impl fmt::Debug for ChipsetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ChipsetDescriptor({:04x}:{:04x} {})", self.vendor, self.device, self.name)
    }
}

/// The supported chipsets. The first one present on the bus is programmed.
pub static CHIPSETS: [ChipsetDescriptor; 7] = [
    ChipsetDescriptor { vendor: ali::VENDOR_ALI, device: 0x1521, name: "ALi Aladdin III", encoder: &ali::Aladdin34 },
    ChipsetDescriptor { vendor: ali::VENDOR_ALI, device: 0x1531, name: "ALi Aladdin IV", encoder: &ali::Aladdin34 },
    ChipsetDescriptor { vendor: ali::VENDOR_ALI, device: 0x1541, name: "ALi Aladdin V", encoder: &ali::Aladdin5 },
    ChipsetDescriptor { vendor: sis::VENDOR_SIS, device: 0x5571, name: "SiS 5571", encoder: &sis::Sis559x },
    ChipsetDescriptor { vendor: sis::VENDOR_SIS, device: 0x5581, name: "SiS 5581/5582", encoder: &sis::Sis559x },
    ChipsetDescriptor { vendor: sis::VENDOR_SIS, device: 0x5591, name: "SiS 5591/5592", encoder: &sis::Sis559x },
    ChipsetDescriptor { vendor: sis::VENDOR_SIS, device: 0x0001, name: "SiS 530/540", encoder: &sis::Sis530 },
];

/// The range a chipset should accelerate: the first write combining range outside
/// the VGA window on a megabyte boundary.
pub fn select_region(mtrr: &MtrrSet) -> Option<&MemoryTypeRange> {
    let range = mtrr.find_first_writable_non_vga_region(REGION_ALIGNMENT_MASK);
    if range.is_none() && mtrr.is_vga_write_combine_requested() {
        warn!("[chipset] VGA burst cycles need another write combined frame buffer region");
    }
    range
}

/// What [`auto_configure`] did.
#[derive(Debug)]
pub enum Outcome {
    SetupNotRequested,
    BusInaccessible,
    NoSupportedChipset,
    Configured {
        chipset: &'static ChipsetDescriptor,
        /// `None` if there was no range the chipset could use.
        region: Option<MemoryTypeRange>,
    },
}

/// Program the first supported chipset found on the bus for the ranges in `mtrr`.
pub fn auto_configure(config: &mut dyn ConfigSpace, mtrr: &MtrrSet, sysinfo: &SysInfo) -> Result<Outcome> {
    if !mtrr.is_setup_requested() {
        warn!("[chipset] MTRR setup not requested, nothing to set up in the chipset");
        return Ok(Outcome::SetupNotRequested);
    }
    if !config.is_accessible() {
        warn!("[chipset] PCI bus inaccessible, skipping chipset tweaks");
        return Ok(Outcome::BusInaccessible);
    }

    for chipset in CHIPSETS.iter() {
        let dev = match pci::find_device_by_id(config, chipset.vendor, chipset.device)? {
            Some(dev) => dev,
            None => continue,
        };
        info!("[chipset] found supported chipset '{}' at {}, applying tweaks", chipset.name, dev);
        debug!("[chipset] cpu: {}", sysinfo.model.map_or("unsupported", |m| m.name()));

        let region = chipset.encoder.encode(config, dev, mtrr)?;
        match region {
            Some(range) => info!("[chipset] frame buffer region {} set up", range),
            None => info!("[chipset] no suitable frame buffer region, registers left alone"),
        }
        return Ok(Outcome::Configured { chipset, region });
    }

    info!("[chipset] no supported chipset found");
    Ok(Outcome::NoSupportedChipset)
}

#[cfg(test)]
mod test {
    use super::*;
    use k6::cpu::{CpuIdentity, VENDOR_AMD};
    use k6::mtrr::VGA_WINDOW;
    use pci::mock::MockBus;

    const HOST: PciAddress = PciAddress::new(0, 0, 0);
    const AGP: PciAddress = PciAddress::new(0, 1, 0);

    fn sysinfo() -> SysInfo {
        SysInfo::new(CpuIdentity::new(*VENDOR_AMD, 5, 0xD, 0), 131072, false, true)
    }

    fn frame_buffer() -> MtrrSet {
        let mut mtrr = MtrrSet::new();
        mtrr.add_region(0xE000_0000, 8192, true, false).unwrap();
        mtrr
    }

    fn chipset_name(outcome: &Outcome) -> Option<&'static str> {
        match outcome {
            Outcome::Configured { chipset, .. } => Some(chipset.name),
            _ => None,
        }
    }

    #[test]
    fn nothing_without_mtrr_setup() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1541, 0x06, 0x00);
        bus.add_device(AGP, 0x10B9, 0x5243, 0x06, 0x04);

        let outcome = auto_configure(&mut bus, &MtrrSet::new(), &sysinfo()).unwrap();
        assert!(matches!(outcome, Outcome::SetupNotRequested));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn inaccessible_bus() {
        let mut bus = MockBus::inaccessible();
        let outcome = auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap();
        assert!(matches!(outcome, Outcome::BusInaccessible));
    }

    #[test]
    fn unknown_chipset() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x8086, 0x7030, 0x06, 0x00);
        let outcome = auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap();
        assert!(matches!(outcome, Outcome::NoSupportedChipset));
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn aladdin4() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1531, 0x06, 0x00);

        let outcome = auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap();
        assert_eq!(chipset_name(&outcome), Some("ALi Aladdin IV"));

        let host = bus.device(HOST).unwrap().config();
        assert_eq!(&host[0x54..0x57], &[0x03, 0xE0, 0x3D]);
        assert_eq!(bus.write_count(), 2);
    }

    #[test]
    fn aladdin5_programs_both_bridges() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1541, 0x06, 0x00);
        bus.add_device(AGP, 0x10B9, 0x5243, 0x06, 0x04);
        let mut mtrr = frame_buffer();
        mtrr.add_region(VGA_WINDOW, 128, true, false).unwrap();

        auto_configure(&mut bus, &mtrr, &sysinfo()).unwrap();

        let host: Vec<_> = bus.writes_to(HOST).map(|w| (w.offset, w.data().to_vec())).collect();
        let agp: Vec<_> = bus.writes_to(AGP).map(|w| (w.offset, w.data().to_vec())).collect();
        assert_eq!(host, vec![(0x84, vec![0x03, 0xE0]), (0x86, vec![0x07])]);
        assert_eq!(host, agp);
    }

    #[test]
    fn aladdin5_without_agp_bridge() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1541, 0x06, 0x00);

        let err = auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap_err();
        assert_eq!(err, ChipsetError::MissingCompanion { vendor: 0x10B9, device: 0x5243 });
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn first_match_wins() {
        let mut bus = MockBus::new();
        // enumerated first, but later in the registry
        bus.add_device(HOST, 0x1039, 0x5591, 0x06, 0x00);
        bus.add_device(PciAddress::new(0, 7, 0), 0x10B9, 0x1521, 0x06, 0x00);

        let outcome = auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap();
        assert_eq!(chipset_name(&outcome), Some("ALi Aladdin III"));
        assert_eq!(bus.writes_to(HOST).count(), 0);
    }

    #[test]
    fn vga_only_writes_nothing() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1531, 0x06, 0x00);
        let mut mtrr = MtrrSet::new();
        mtrr.add_region(VGA_WINDOW, 128, true, false).unwrap();

        let outcome = auto_configure(&mut bus, &mtrr, &sysinfo()).unwrap();
        match outcome {
            Outcome::Configured { region, .. } => assert_eq!(region, None),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(bus.write_count(), 0);
    }

    #[test]
    fn sis5591_keeps_characteristics() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x1039, 0x5591, 0x06, 0x00)
            .set_register(0x82, &[0b1000_0011]);

        auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap();

        let writes: Vec<_> = bus.writes().map(|w| (w.offset, w.data().to_vec())).collect();
        assert_eq!(writes, vec![
            (0x88, vec![0x00, 0xE0]),
            (0x8A, vec![0x80, 0xFF]),
            (0x82, vec![0b1001_0011]),
        ]);
    }

    #[test]
    fn sis530_window() {
        let mut bus = MockBus::new();
        // the integrated PCI to AGP bridge, registers 22h-25h are its prefetchable window
        bus.add_device(HOST, 0x1039, 0x0001, 0x06, 0x04)
            .set_header_type(1);

        auto_configure(&mut bus, &frame_buffer(), &sysinfo()).unwrap();

        let host = bus.device(HOST).unwrap().config();
        assert_eq!(&host[0x22..0x26], &[0x00, 0xE0, 0x70, 0xE0]);
    }

    #[test]
    fn uncacheable_range_gets_no_bursts() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1531, 0x06, 0x00);
        let mut mtrr = MtrrSet::new();
        mtrr.add_region(0xE000_0000, 8192, true, true).unwrap();

        let outcome = auto_configure(&mut bus, &mtrr, &sysinfo()).unwrap();
        match outcome {
            Outcome::Configured { region, .. } => assert_eq!(region, None),
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(bus.write_count(), 0);

        mtrr.add_region(0xD800_0000, 4096, true, false).unwrap();
        let outcome = auto_configure(&mut bus, &mtrr, &sysinfo()).unwrap();
        match outcome {
            Outcome::Configured { region, .. } => assert_eq!(region.map(|r| r.offset), Some(0xD800_0000)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn misaligned_region_is_skipped() {
        let mut bus = MockBus::new();
        bus.add_device(HOST, 0x10B9, 0x1521, 0x06, 0x00);
        let mut mtrr = MtrrSet::new();
        mtrr.add_region(0xE002_0000, 1024, true, false).unwrap();
        mtrr.add_region(0xD000_0000, 4096, true, false).unwrap();

        let outcome = auto_configure(&mut bus, &mtrr, &sysinfo()).unwrap();
        match outcome {
            Outcome::Configured { region, .. } => assert_eq!(region.map(|r| r.offset), Some(0xD000_0000)),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
