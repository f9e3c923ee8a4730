//! Sequencing of everything that gets configured in one run.

use core::fmt;

use bare_metal::processor::Processor;
use chipset::{ChipsetError, Outcome};
use k6::cache;
use k6::efer::{self, WriteOrderMode};
use k6::multiplier::{self, Multiplier};
use k6::whcr::{self, WriteAllocate};
use k6::{uwccr, Addition, Capabilities, MemoryTypeRange, MtrrSet, SysInfo};
use pci::{BarKind, ConfigSpace, DeviceInfo};
use vesa::VesaBios;

use crate::discovery::{self, DiscoveryReport};
use crate::error::{Error, Result};
use crate::params::{MtrrParams, MtrrRequest, Parameters};

/// Formats memory type ranges as `<0: 8192 KB @ e0000000 WC> <1: unconfigured>`.
pub struct Ranges<'r>(pub &'r [MemoryTypeRange]);

impl<'r> fmt::Display for Ranges<'r> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for (index, range) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str(" ")?;
            }
            write!(f, "<{}: {}>", index, range)?;
        }
        Ok(())
    }
}

pub fn on_off(enabled: bool) -> &'static str {
    if enabled { "On" } else { "Off" }
}

/// Log the outcome of one action, returning whether it succeeded.
fn report(label: fmt::Arguments, result: &Result<()>) -> bool {
    match result {
        Ok(()) => {
            info!("[ OK ] {}", label);
            true
        }
        Err(err) => {
            error!("[FAIL] {}: {}", label, err);
            false
        }
    }
}

/// Owns the memory type ranges of the run and the hardware interfaces to program them with.
pub struct Driver<'a> {
    sysinfo: &'a SysInfo,
    mtrr: MtrrSet,
    config: &'a mut dyn ConfigSpace,
    vesa: &'a dyn VesaBios,
    cpu: &'a mut dyn Processor,
}

impl<'a> Driver<'a> {
    pub fn new(sysinfo: &'a SysInfo, config: &'a mut dyn ConfigSpace, vesa: &'a dyn VesaBios, cpu: &'a mut dyn Processor) -> Driver<'a> {
        Driver { sysinfo, mtrr: MtrrSet::new(), config, vesa, cpu }
    }

    pub fn mtrr(&self) -> &MtrrSet {
        &self.mtrr
    }

    fn require(&self, capabilities: Capabilities, what: &'static str) -> Result<()> {
        if self.sysinfo.supports(capabilities) {
            Ok(())
        } else {
            Err(Error::Unsupported(what))
        }
    }

    pub fn add_manual_region(&mut self, offset: u32, size_kb: u32, write_combine: bool, uncacheable: bool) -> Result<Addition> {
        Ok(self.mtrr.add_region(offset, size_kb, write_combine, uncacheable)?)
    }

    pub fn clear_all_regions(&mut self) -> Result<()> {
        Ok(self.mtrr.clear()?)
    }

    /// Apply the manual `/mtrr`, `/vga` and `/mtrrclr` switches in command line order.
    pub fn apply_requests(&mut self, params: &MtrrParams) -> Result<()> {
        if params.setup {
            self.mtrr.request_setup();
        }
        for request in params.requests() {
            match *request {
                MtrrRequest::Add { offset, size_kb, write_combine, uncacheable } => {
                    self.add_manual_region(offset, size_kb, write_combine, uncacheable)?;
                }
                MtrrRequest::Clear => self.clear_all_regions()?,
            }
        }
        Ok(())
    }

    /// Look for frame buffers, VESA first.
    pub fn run_discovery(&mut self, use_pci: bool, use_vesa: bool) -> Result<DiscoveryReport> {
        let mut report = DiscoveryReport::default();
        if use_vesa {
            report += discovery::discover_lfb(self.vesa, &mut self.mtrr);
        }
        if use_pci {
            report += discovery::discover_pci(&mut *self.config, &mut self.mtrr)?;
        }
        Ok(report)
    }

    /// Write the ranges to the processor.
    pub fn commit_mtrr_hardware(&mut self) -> Result<()> {
        self.require(Capabilities::EXTENDED_MTRR, "memory type range setup")?;
        uwccr::commit(&mut *self.cpu, &self.mtrr);
        info!("[mtrr] New MTRR setup: {}", Ranges(self.mtrr.ranges()));
        Ok(())
    }

    pub fn configure_mtrr(&mut self, use_pci: bool, use_vesa: bool) -> Result<()> {
        self.require(Capabilities::EXTENDED_MTRR, "memory type range setup")?;
        let report = self.run_discovery(use_pci, use_vesa)?;
        debug!("[mtrr] discovery added {}, {} already known", report.added, report.known);
        self.commit_mtrr_hardware()
    }

    pub fn run_chipset_auto_config(&mut self) -> Result<Outcome> {
        Ok(chipset::auto_configure(&mut *self.config, &self.mtrr, self.sysinfo)?)
    }

    pub fn configure_write_allocate(&mut self, config: &WriteAllocate) -> Result<()> {
        whcr::commit(&mut *self.cpu, self.sysinfo.whcr_layout(), config);
        Ok(())
    }

    pub fn configure_write_order(&mut self, mode: WriteOrderMode) -> Result<()> {
        self.require(Capabilities::WRITE_ORDERING, "write ordering")?;
        efer::set_write_order_mode(&mut *self.cpu, mode);
        Ok(())
    }

    pub fn configure_prefetch(&mut self, enable: bool) -> Result<()> {
        self.require(Capabilities::WRITE_ORDERING, "data prefetch control")?;
        efer::set_data_prefetch(&mut *self.cpu, enable);
        Ok(())
    }

    pub fn configure_multiplier(&mut self, ratio: Multiplier) -> Result<()> {
        self.require(Capabilities::MULTIPLIER, "clock multiplier control")?;
        multiplier::set(&mut *self.cpu, ratio);
        Ok(())
    }

    pub fn configure_l1(&mut self, enable: bool) -> Result<()> {
        cache::set_l1(&mut *self.cpu, enable);
        Ok(())
    }

    pub fn configure_l2(&mut self, enable: bool) -> Result<()> {
        self.require(Capabilities::ON_DIE_L2, "L2 cache control")?;
        cache::set_l2(&mut *self.cpu, enable);
        Ok(())
    }

    /// Log every device on the bus together with its windows.
    pub fn list_bars(&mut self) -> Result<()> {
        if !self.config.is_accessible() {
            return Err(Error::BusInaccessible);
        }

        let mut cursor = None;
        while let Some(dev) = pci::next_device(&mut *self.config, cursor)? {
            cursor = Some(dev);
            let info = DeviceInfo::read(&mut *self.config, dev)?;
            info!("[pci] {} vendor {:04x} device {:04x} class {:02x} subclass {:02x}",
                dev, info.vendor, info.device, info.class_code, info.subclass);
            for (index, bar) in info.bars.iter().enumerate().filter(|(_, b)| b.address != 0) {
                let kind = match bar.kind {
                    BarKind::Memory => "Memory",
                    BarKind::Io => "I/O",
                };
                info!("[pci]    BAR {} @ {:#010x} ({}) size {} KB", index, bar.address, kind, bar.size / 1024);
            }
        }
        Ok(())
    }

    /// Perform every action `params` asks for. A failed action does not stop the
    /// following ones, except for a chipset that is only partially present.
    pub fn run(&mut self, params: &Parameters) -> Result<()> {
        let mut ok = true;

        if params.list_bars {
            ok &= report(format_args!("List PCI/AGP device BARs"), &self.list_bars());
        }
        if params.mtrr.setup {
            ok &= report(format_args!("Set MTRR Config"), &self.configure_mtrr(params.mtrr.pci, params.mtrr.lfb));
        }
        if params.chipset {
            let result = self.run_chipset_auto_config().map(|_| ());
            ok &= report(format_args!("Set Chipset Tweaks"), &result);
            if let Err(err @ Error::Chipset(ChipsetError::MissingCompanion { .. })) = result {
                return Err(err);
            }
        }
        if params.write_allocate.setup {
            let config = WriteAllocate { size_kb: params.write_allocate.size_kb, hole: params.write_allocate.hole };
            ok &= report(format_args!("Set Write Allocate Config ({} KB)", config.size_kb), &self.configure_write_allocate(&config));
        }
        if let Some(mode) = params.write_order {
            ok &= report(format_args!("Set Write Order Mode ({})", mode), &self.configure_write_order(mode));
        }
        if let Some(ratio) = params.multiplier {
            ok &= report(format_args!("Set CPU Multiplier ({}x)", ratio), &self.configure_multiplier(ratio));
        }
        if let Some(enable) = params.l1_cache {
            ok &= report(format_args!("Set L1 Cache ({})", on_off(enable)), &self.configure_l1(enable));
        }
        if let Some(enable) = params.l2_cache {
            ok &= report(format_args!("Set L2 Cache ({})", on_off(enable)), &self.configure_l2(enable));
        }
        if let Some(enable) = params.prefetch {
            ok &= report(format_args!("Set Data Prefetch ({})", on_off(enable)), &self.configure_prefetch(enable));
        }

        if ok {
            Ok(())
        } else {
            warn!("Summary: Some actions failed!");
            Err(Error::ActionsFailed)
        }
    }
}
