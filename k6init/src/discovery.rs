//! Finding frame buffers worth write combining.
//!
//! Both scanners only feed [`MtrrSet::add_region`]. A missing VESA BIOS or PCI bus
//! just means nothing is found, and a window the set rejects is skipped.

use core::ops::AddAssign;

use k6::{Addition, MtrrError, MtrrSet};
use pci::{ConfigSpace, DeviceInfo, PciError, CLASS_DISPLAY, REG_CLASS, REG_SUBCLASS, SUBCLASS_VGA};
use vesa::VesaBios;

/// Frame buffers are at least this large, smaller windows are register files.
pub const MIN_PCI_FRAME_BUFFER: u32 = 1024 * 1024;

/// How many windows a scan added and how many it skipped because they were already present.
#[derive(Eq, PartialEq, Copy, Clone, Debug, Default)]
pub struct DiscoveryReport {
    pub added: usize,
    pub known: usize,
}

impl AddAssign for DiscoveryReport {
    fn add_assign(&mut self, other: DiscoveryReport) {
        self.added += other.added;
        self.known += other.known;
    }
}

/// Outcome of offering one window to the set. `false` stops the scan.
fn offer(mtrr: &mut MtrrSet, report: &mut DiscoveryReport, offset: u32, size_kb: u32) -> bool {
    match mtrr.add_region(offset, size_kb, true, false) {
        Ok(Addition::Added) => {
            report.added += 1;
            true
        }
        Ok(Addition::AlreadyKnown) => {
            report.known += 1;
            true
        }
        Err(err @ MtrrError::ClearPending) | Err(err @ MtrrError::Full) => {
            warn!("[discovery] frame buffer at {:#010x} dropped: {}", offset, err);
            false
        }
        Err(err) => {
            warn!("[discovery] frame buffer at {:#010x} dropped: {}", offset, err);
            true
        }
    }
}

/// Add the linear frame buffers of all VESA modes, each sized to the whole video memory.
pub fn discover_lfb(vesa: &dyn VesaBios, mtrr: &mut MtrrSet) -> DiscoveryReport {
    let mut report = DiscoveryReport::default();
    if !vesa.is_valid() {
        warn!("[discovery] no VESA BIOS, skipping linear frame buffer detection");
        return report;
    }

    let vram_kb = vesa.vram_size() / 1024;
    for index in 0..vesa.mode_count() {
        if mtrr.is_full() {
            debug!("[discovery] all ranges in use, stopping at mode {}", index);
            break;
        }
        let mode = match vesa.mode_info(index) {
            Ok(mode) => mode,
            Err(err) => {
                warn!("[discovery] {}", err);
                continue;
            }
        };
        let lfb = match mode.lfb_address() {
            Some(lfb) => lfb,
            None => continue,
        };
        if mtrr.is_known(lfb) {
            report.known += 1;
            continue;
        }

        info!("[discovery] found VESA linear frame buffer at {:#010x} ({}x{})", lfb, mode.width, mode.height);
        if !offer(mtrr, &mut report, lfb, vram_kb) {
            break;
        }
    }

    info!("[discovery] added {} linear frame buffers, {} already known", report.added, report.known);
    report
}

/// Add the memory windows of 1 MiB or more of all VGA compatible PCI/AGP devices.
pub fn discover_pci(config: &mut dyn ConfigSpace, mtrr: &mut MtrrSet) -> Result<DiscoveryReport, PciError> {
    let mut report = DiscoveryReport::default();
    if !config.is_accessible() {
        warn!("[discovery] PCI bus inaccessible, skipping PCI/AGP frame buffer detection");
        return Ok(report);
    }

    let mut cursor = None;
    'devices: while let Some(dev) = pci::next_device(config, cursor)? {
        cursor = Some(dev);
        if config.read_u8(dev, REG_CLASS)? != CLASS_DISPLAY || config.read_u8(dev, REG_SUBCLASS)? != SUBCLASS_VGA {
            continue;
        }

        let info = DeviceInfo::read(config, dev)?;
        for bar in info.memory_bars().filter(|b| b.size >= MIN_PCI_FRAME_BUFFER) {
            if mtrr.is_full() {
                debug!("[discovery] all ranges in use, stopping at {}", dev);
                break 'devices;
            }
            if mtrr.is_known(bar.address) {
                report.known += 1;
                continue;
            }

            info!("[discovery] found PCI/AGP frame buffer at {:#010x} ({})", bar.address, dev);
            if !offer(mtrr, &mut report, bar.address, bar.size / 1024) {
                break 'devices;
            }
        }
    }

    info!("[discovery] added {} PCI/AGP frame buffers, {} already known", report.added, report.known);
    Ok(report)
}
