//! Boot time configuration of AMD K6 family processors and their chipsets for fast
//! frame buffer access: write combining memory type ranges, write allocate, write
//! ordering, data prefetch and chipset frame buffer bursts. It can also switch the
//! caches and the clock multiplier of the K6-2+/III+.
//!
//! The real mode loader collects what needs the BIOS (memory size, VBE blocks) and
//! calls [`k6init_main`] once, before any memory manager is loaded.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate log;

pub mod cmdline;
pub mod discovery;
pub mod driver;
pub mod error;
pub mod logger;
pub mod params;

mod panic;

pub use self::driver::Driver;
pub use self::error::{Error, Result};
pub use self::params::Parameters;

use core::slice;

use bare_metal::msr::{MsrAccess, K6_EFER};
use bare_metal::processor::{Hardware, Processor};
use k6::{cache, efer, multiplier, uwccr, whcr, Capabilities, CpuIdentity, SysInfo};
use pci::port::PortConfigSpace;
use pci::ConfigSpace;
use vesa::{CapturedBios, VesaBios};

use self::cmdline::CmdLine;
use self::driver::{on_off, Ranges};
use self::params::ParamError;

pub const VERSION: &str = concat!("K6INIT ", env!("CARGO_PKG_VERSION"));

/// Arguments passed by the loader.
#[repr(C)]
#[derive(Debug, Copy, Clone)]
pub struct BootArgs {
    cmdline: *const u8,
    cmdline_len: usize,
    /// Installed memory in KiB.
    memory_kb: u32,
    /// Non-zero if the board has a memory hole at 15-16 MiB.
    memory_hole: u8,
    /// 0 under plain DOS, 1 in virtual 8086 mode, 2 in a Windows DOS box.
    environment: u8,
    /// Result of VBE function 00h, empty if the call failed.
    vbe_info: *const u8,
    vbe_info_len: usize,
    /// Results of VBE function 01h for every mode in the mode list, back to back.
    vbe_modes: *const u8,
    vbe_modes_len: usize,
}

unsafe fn raw_bytes<'a>(ptr: *const u8, len: usize) -> &'a [u8] {
    if ptr.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(ptr, len)
    }
}

impl BootArgs {
    /// `None` if the command line is not ASCII. Unsafe because the loader must have
    /// passed valid buffers, which this can't check.
    pub unsafe fn cmdline(&self) -> Option<&str> {
        core::str::from_utf8(raw_bytes(self.cmdline, self.cmdline_len)).ok()
    }

    pub unsafe fn vbe_info(&self) -> &[u8] {
        raw_bytes(self.vbe_info, self.vbe_info_len)
    }

    pub unsafe fn vbe_modes(&self) -> &[u8] {
        raw_bytes(self.vbe_modes, self.vbe_modes_len)
    }

    pub fn memory_kb(&self) -> u32 {
        self.memory_kb
    }

    pub fn memory_hole(&self) -> bool {
        self.memory_hole != 0
    }

    pub fn environment(&self) -> Environment {
        match self.environment {
            0 => Environment::Dos,
            1 => Environment::V86,
            _ => Environment::Windows,
        }
    }
}

/// What the loader found us running under.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum Environment {
    Dos,
    /// Under a memory manager such as EMM386, which traps every privileged instruction.
    V86,
    Windows,
}

/// Only plain DOS gives us the processor to ourselves.
pub fn check_environment(environment: Environment) -> Result<()> {
    match environment {
        Environment::Dos => Ok(()),
        Environment::V86 => {
            error!("[k6init] {}", Error::V86Mode);
            error!("Load it in CONFIG.SYS before memory managers!");
            error!("Example: DEVICE=K6INIT.EXE /auto");
            Err(Error::V86Mode)
        }
        Environment::Windows => {
            error!("[k6init] {}", Error::Windows);
            Err(Error::Windows)
        }
    }
}

/// This is the Rust entry point called by the loader. Returns 0 on success.
#[no_mangle]
pub extern "C" fn k6init_main(args: &BootArgs) -> i32 {
    // only fails if a logger is already installed, which is just as good
    let _ = logger::init();

    if let Err(err) = check_environment(args.environment()) {
        return err.exit_status();
    }

    let cmdline = match unsafe { args.cmdline() } {
        Some(cmdline) => cmdline,
        None => {
            error!("[k6init] command line is not ASCII");
            return -1;
        }
    };
    let bios = unsafe { CapturedBios::new(args.vbe_info(), args.vbe_modes()) };
    let sysinfo = SysInfo::new(CpuIdentity::detect(), args.memory_kb(), args.memory_hole(), bios.is_valid());
    let mut config = unsafe { PortConfigSpace::new() };
    let mut cpu = unsafe { Hardware::new() };

    match run(cmdline, &sysinfo, &mut config, &bios, &mut cpu) {
        Ok(()) => 0,
        Err(err) => err.exit_status(),
    }
}

/// Parse `cmdline` and do what it asks for.
pub fn run(cmdline: &str, sysinfo: &SysInfo, config: &mut dyn ConfigSpace, vesa: &dyn VesaBios, cpu: &mut dyn Processor) -> Result<()> {
    let params = Parameters::from_cmdline(CmdLine::parse(cmdline), sysinfo);
    let quiet = params.as_ref().map_or(false, |p| p.quiet);
    logger::set_quiet(quiet);

    print_sysinfo(sysinfo, vesa, cpu);

    if let Err(err) = sysinfo.cpu.classify() {
        error!("[k6init] {}", err);
        error!("Please run this program on an AMD-K6/K6-2/K6-2+/K6-III/K6-III+!");
        return Err(err.into());
    }
    let params = match params {
        Ok(params) => params,
        Err(ParamError::NoArguments) => {
            warn!("No arguments given.");
            return Err(ParamError::NoArguments.into());
        }
        Err(err) => {
            error!("[k6init] {}", err);
            error!("User input error, quitting...");
            return Err(err.into());
        }
    };

    if params.list_bars && params.quiet {
        warn!("/listbars used with /quiet, unmuting the program!");
        logger::set_quiet(false);
    }

    if params.status {
        print_status(sysinfo, cpu);
    }

    let mut driver = Driver::new(sysinfo, config, vesa, cpu);
    if let Err(err) = driver.apply_requests(&params.mtrr) {
        error!("[k6init] {}", err);
        error!("User input error, quitting...");
        return Err(err);
    }
    driver.run(&params)
}

/// What we know about the machine before touching anything.
fn print_sysinfo(sysinfo: &SysInfo, vesa: &dyn VesaBios, cpu: &mut dyn Processor) {
    info!("{}", VERSION);

    let id = &sysinfo.cpu;
    let l1 = on_off(cache::is_l1_enabled(cpu));
    match sysinfo.model {
        Some(model) if sysinfo.supports(Capabilities::ON_DIE_L2) => {
            let l2 = on_off(cache::is_l2_enabled(cpu.read(K6_EFER)));
            info!("CPU   | {} (L1: {}, L2: {})", model, l1, l2);
        }
        Some(model) => info!("CPU   | {} (L1: {})", model, l1),
        None => info!("CPU   | [{}] Family {} Model {} Stepping {}", id.vendor(), id.family, id.model, id.stepping),
    }

    if sysinfo.memory_kb > 0 {
        info!("RAM   | {} KB, 15MB Hole: {}", sysinfo.memory_kb, if sysinfo.memory_hole { "Yes" } else { "No" });
    } else {
        warn!("RAM   | ? (Detection failed!)");
    }

    match vesa.info() {
        Some(info) if sysinfo.vesa_present => {
            let (major, minor) = info.version();
            info!("VBIOS | VESA {:x}.{:x}, {} modes, {} MB", major, minor, vesa.mode_count(), vesa.vram_size() >> 20);
        }
        _ => info!("VBIOS | <No VESA compatible VGA BIOS detected>"),
    }

    if sysinfo.supports(Capabilities::EXTENDED_MTRR) {
        info!("MTRR  | {}", Ranges(&uwccr::read(cpu)));
    } else {
        info!("MTRR  | < Not supported by CPU >");
    }
}

/// The current settings of everything the switches can change.
fn print_status(sysinfo: &SysInfo, cpu: &mut dyn Processor) {
    if sysinfo.model.is_none() {
        return;
    }

    let write_allocate = whcr::read(cpu, sysinfo.whcr_layout());
    info!("WA    | {} KB, 15MB Hole: {}", write_allocate.size_kb, if write_allocate.hole { "Yes" } else { "No" });

    if sysinfo.supports(Capabilities::WRITE_ORDERING) {
        let value = cpu.read(K6_EFER);
        match efer::write_order_mode(value) {
            Some(mode) => info!("WO    | {}", mode),
            None => warn!("WO    | reserved mode in EFER {:#x}", value),
        }
        info!("DPF   | {}", on_off(efer::is_data_prefetch_enabled(value)));
    }

    if sysinfo.supports(Capabilities::MULTIPLIER) {
        info!("MULTI | {}x", multiplier::read(cpu));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use bare_metal::cpu::io::PortNumber;
    use bare_metal::cpu::CR0_CD;
    use bare_metal::msr::{K6_EPMR, K6_UWCCR, K6_WHCR};
    use bare_metal::processor::mock::{RecordingCpu, Write};
    use k6::cpu::VENDOR_AMD;
    use k6::{CpuError, MtrrError};
    use pci::mock::MockBus;
    use std::vec::Vec;

    fn sysinfo(vendor: &[u8; 12], model: u8, stepping: u8) -> SysInfo {
        SysInfo::new(CpuIdentity::new(*vendor, 5, model, stepping), 131072, false, false)
    }

    fn run_with(cmdline: &str, sysinfo: &SysInfo, cpu: &mut RecordingCpu) -> Result<()> {
        let mut bus = MockBus::new();
        run(cmdline, sysinfo, &mut bus, &CapturedBios::absent(), cpu)
    }

    #[test]
    fn no_arguments() {
        let mut cpu = RecordingCpu::new();
        let result = run_with("  ", &sysinfo(VENDOR_AMD, 8, 0xC), &mut cpu);
        assert_eq!(result, Err(Error::Params(ParamError::NoArguments)));
        assert_eq!(result.unwrap_err().exit_status(), 1);
        assert_eq!(cpu.write_count(), 0);
    }

    #[test]
    fn unsupported_cpu_wins_over_everything() {
        let mut cpu = RecordingCpu::new();
        let result = run_with("/auto", &sysinfo(VENDOR_AMD, 5, 0), &mut cpu);
        assert_eq!(result, Err(Error::Cpu(CpuError::Unsupported { family: 5, model: 5, stepping: 0 })));

        let result = run_with("", &sysinfo(b"GenuineIntel", 8, 1), &mut cpu);
        assert_eq!(result, Err(Error::Cpu(CpuError::NotAmd)));
        assert_eq!(result.unwrap_err().exit_status(), -1);
        assert_eq!(cpu.write_count(), 0);
    }

    #[test]
    fn bad_switch_does_nothing() {
        let mut cpu = RecordingCpu::new();
        let result = run_with("/wa:0 /frobnicate", &sysinfo(VENDOR_AMD, 8, 0xC), &mut cpu);
        assert_eq!(result, Err(Error::Params(ParamError::UnknownSwitch)));
        assert_eq!(cpu.write_count(), 0);
    }

    #[test]
    fn bad_manual_region_does_nothing() {
        let mut cpu = RecordingCpu::new();
        let result = run_with("/mtrr:0xE0000000,8192,1,0 /mtrrclr /wa:0", &sysinfo(VENDOR_AMD, 9, 1), &mut cpu);
        assert_eq!(result, Err(Error::Mtrr(MtrrError::AlreadyConfigured)));

        let result = run_with("/mtrr:0xE0010000,8192,1,0", &sysinfo(VENDOR_AMD, 9, 1), &mut cpu);
        assert_eq!(result, Err(Error::Mtrr(MtrrError::Misaligned(0xE001_0000))));
        assert_eq!(cpu.write_count(), 0);
    }

    #[test]
    fn successful_run() {
        let mut cpu = RecordingCpu::new();
        let result = run_with("/quiet /vga /mtrr:0xE0000000,8192,1,0 /wa:0", &sysinfo(VENDOR_AMD, 8, 0xC), &mut cpu);
        assert_eq!(result, Ok(()));
        let ranges = uwccr::decode(cpu.value(K6_UWCCR));
        assert!(ranges[0].is_vga());
        assert_eq!(ranges[1].offset, 0xE000_0000);
        assert_ne!(cpu.value(K6_WHCR), 0);
    }

    #[test]
    fn boot_args() {
        let cmdline = b"/auto /quiet";
        let info = [0_u8; 16];
        let args = BootArgs {
            cmdline: cmdline.as_ptr(),
            cmdline_len: cmdline.len(),
            memory_kb: 65536,
            memory_hole: 1,
            environment: 0,
            vbe_info: info.as_ptr(),
            vbe_info_len: info.len(),
            vbe_modes: core::ptr::null(),
            vbe_modes_len: 512,
        };
        unsafe {
            assert_eq!(args.cmdline(), Some("/auto /quiet"));
            assert_eq!(args.vbe_info().len(), 16);
            assert!(args.vbe_modes().is_empty());
        }
        assert!(args.memory_hole());

        let bad = [0xFF_u8, 0xFE];
        let args = BootArgs { cmdline: bad.as_ptr(), cmdline_len: bad.len(), ..args };
        assert_eq!(unsafe { args.cmdline() }, None);

        assert_eq!(args.environment(), Environment::Dos);
        assert_eq!(BootArgs { environment: 1, ..args }.environment(), Environment::V86);
        assert_eq!(BootArgs { environment: 2, ..args }.environment(), Environment::Windows);
    }

    #[test]
    fn refuses_v86_and_windows() {
        assert_eq!(check_environment(Environment::Dos), Ok(()));
        assert_eq!(check_environment(Environment::V86), Err(Error::V86Mode));
        assert_eq!(check_environment(Environment::Windows), Err(Error::Windows));
    }

    #[test]
    fn status_only_reads() {
        let mut cpu = RecordingCpu::new()
            .with(K6_WHCR, 0x0000_FF00)
            .with(K6_EFER, 0x06)
            .with_cr0(0x11)
            .with_port(PortNumber(0xFFF8), 0x6B);
        let result = run_with("/status /quiet", &sysinfo(VENDOR_AMD, 13, 4), &mut cpu);
        assert_eq!(result, Ok(()));
        // reading the multiplier maps the power management block in and out again
        let writes: Vec<_> = cpu.msr_writes().map(|(msr, value, _)| (msr, value)).collect();
        assert_eq!(writes, vec![(K6_EPMR, 0xFFF1), (K6_EPMR, 0xFFF0)]);
        assert_eq!(cpu.value(K6_WHCR), 0x0000_FF00);
    }

    #[test]
    fn cache_switches() {
        let mut cpu = RecordingCpu::new().with(K6_EFER, 0x10).with_cr0(0x11 | CR0_CD);
        let result = run_with("/auto", &sysinfo(VENDOR_AMD, 9, 1), &mut cpu);
        assert_eq!(result, Ok(()));
        assert_eq!(cpu.cr0(), 0x11);
        assert!(cache::is_l2_enabled(cpu.value(K6_EFER)));

        let mut cpu = RecordingCpu::new().with_cr0(0x11);
        let result = run_with("/auto /skipcpu /l1:0", &sysinfo(VENDOR_AMD, 8, 0xC), &mut cpu);
        assert_eq!(result, Ok(()));
        assert_eq!(cpu.cr0(), 0x11 | CR0_CD);
    }

    #[test]
    fn multiplier_on_older_processor_fails() {
        let mut cpu = RecordingCpu::new();
        let result = run_with("/multi:5.0 /wa:0", &sysinfo(VENDOR_AMD, 9, 1), &mut cpu);
        assert_eq!(result, Err(Error::ActionsFailed));
        assert!(cpu.writes().all(|w| !matches!(w, Write::Port(..))));
        assert_ne!(cpu.value(K6_WHCR), 0);
    }
}
