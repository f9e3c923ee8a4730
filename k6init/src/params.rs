//! What the user asked for, built from the command line.

use k6::efer::WriteOrderMode;
use k6::mtrr::VGA_WINDOW;
use k6::multiplier::Multiplier;
use k6::{Capabilities, SysInfo};
use thiserror::Error;

use crate::cmdline::{CmdLine, CmdLineToken};

/// Manual `/mtrr`, `/vga` and `/mtrrclr` switches that can be queued.
pub const MAX_REQUESTS: usize = 4;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamError {
    #[error("no arguments given")]
    NoArguments,
    #[error("unknown switch")]
    UnknownSwitch,
    #[error("/{0} needs a value")]
    MissingValue(&'static str),
    #[error("/{0} does not take a value")]
    UnexpectedValue(&'static str),
    #[error("invalid value for /{0}")]
    InvalidValue(&'static str),
    #[error("too many manual memory type ranges")]
    TooManyRegions,
    #[error("{0} is not supported by this processor")]
    Unsupported(&'static str),
    #[error("can't force the 15-16 MiB hole without setting up write allocate")]
    WaHoleWithoutWriteAllocate,
}

pub type Result<T> = core::result::Result<T, ParamError>;

/// A manual change to the memory type ranges, applied in command line order.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum MtrrRequest {
    Add { offset: u32, size_kb: u32, write_combine: bool, uncacheable: bool },
    Clear,
}

#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct MtrrParams {
    pub setup: bool,
    /// Look for frame buffers of PCI/AGP display adapters.
    pub pci: bool,
    /// Look for VESA linear frame buffers.
    pub lfb: bool,
    requests: [Option<MtrrRequest>; MAX_REQUESTS],
}

impl MtrrParams {
    pub fn requests(&self) -> impl Iterator<Item = &MtrrRequest> {
        self.requests.iter().flatten()
    }

    fn push(&mut self, request: MtrrRequest) -> Result<()> {
        let slot = self.requests.iter_mut()
            .find(|r| r.is_none())
            .ok_or(ParamError::TooManyRegions)?;
        *slot = Some(request);
        self.setup = true;
        Ok(())
    }
}

#[derive(Eq, PartialEq, Copy, Clone, Debug, Default)]
pub struct WriteAllocateParams {
    pub setup: bool,
    pub size_kb: u32,
    pub hole: bool,
}

#[derive(Eq, PartialEq, Clone, Debug, Default)]
pub struct Parameters {
    pub quiet: bool,
    /// Log the current register state before changing anything.
    pub status: bool,
    pub list_bars: bool,
    pub chipset: bool,
    pub mtrr: MtrrParams,
    pub write_allocate: WriteAllocateParams,
    /// `None` leaves the write ordering alone.
    pub write_order: Option<WriteOrderMode>,
    /// `None` leaves data prefetch alone.
    pub prefetch: Option<bool>,
    pub l1_cache: Option<bool>,
    /// Only ever set on processors with an on-die L2 cache.
    pub l2_cache: Option<bool>,
    pub multiplier: Option<Multiplier>,
}

impl Parameters {
    /// Build the parameters of this run. Switch names are case insensitive.
    pub fn from_cmdline(cmdline: CmdLine, sysinfo: &SysInfo) -> Result<Parameters> {
        if cmdline.is_empty() {
            return Err(ParamError::NoArguments);
        }

        let mut state = ParseState { params: Parameters::default(), sysinfo, forced_hole: None };
        for token in cmdline {
            let switch = SWITCHES.iter()
                .find(|s| s.name.eq_ignore_ascii_case(token.key()))
                .ok_or_else(|| {
                    error!("[params] unknown switch '/{}'", token.key());
                    ParamError::UnknownSwitch
                })?;

            match (switch.value, token) {
                (Value::None, CmdLineToken::Flag(_)) => (switch.apply)(&mut state, "")?,
                (Value::Required, CmdLineToken::KeyValuePair(_, value)) if !value.is_empty() => {
                    (switch.apply)(&mut state, value)?
                }
                (Value::None, _) => return Err(ParamError::UnexpectedValue(switch.name)),
                (Value::Required, _) => return Err(ParamError::MissingValue(switch.name)),
            }
        }

        if let Some(hole) = state.forced_hole {
            if !state.params.write_allocate.setup {
                return Err(ParamError::WaHoleWithoutWriteAllocate);
            }
            state.params.write_allocate.hole = hole;
        }
        Ok(state.params)
    }
}

struct ParseState<'s> {
    params: Parameters,
    sysinfo: &'s SysInfo,
    /// `/wahole` wins over the detected hole no matter where it appears.
    forced_hole: Option<bool>,
}

impl<'s> ParseState<'s> {
    fn require(&self, capabilities: Capabilities, what: &'static str) -> Result<()> {
        if self.sysinfo.supports(capabilities) {
            Ok(())
        } else {
            Err(ParamError::Unsupported(what))
        }
    }
}

#[derive(Copy, Clone)]
enum Value {
    None,
    Required,
}

struct Switch {
    name: &'static str,
    value: Value,
    apply: fn(&mut ParseState, &str) -> Result<()>,
}

static SWITCHES: [Switch; 21] = [
    Switch { name: "quiet", value: Value::None, apply: |s, _| { s.params.quiet = true; Ok(()) } },
    Switch { name: "status", value: Value::None, apply: |s, _| { s.params.status = true; Ok(()) } },
    Switch { name: "auto", value: Value::None, apply: auto_setup },
    Switch { name: "skippci", value: Value::None, apply: |s, _| { s.params.mtrr.pci = false; Ok(()) } },
    Switch { name: "skiplfb", value: Value::None, apply: |s, _| { s.params.mtrr.lfb = false; Ok(()) } },
    Switch { name: "skipcpu", value: Value::None, apply: |s, _| {
        s.params.l1_cache = None;
        s.params.l2_cache = None;
        s.params.prefetch = None;
        Ok(())
    } },
    Switch { name: "skipwawo", value: Value::None, apply: |s, _| {
        s.params.write_allocate.setup = false;
        s.params.write_order = None;
        Ok(())
    } },
    Switch { name: "chipset", value: Value::None, apply: |s, _| { s.params.chipset = true; Ok(()) } },
    Switch { name: "mtrr", value: Value::Required, apply: add_mtrr },
    Switch { name: "mtrrclr", value: Value::None, apply: |s, _| s.params.mtrr.push(MtrrRequest::Clear) },
    Switch { name: "lfb", value: Value::None, apply: |s, _| {
        s.params.mtrr.setup = true;
        s.params.mtrr.lfb = true;
        Ok(())
    } },
    Switch { name: "pci", value: Value::None, apply: |s, _| {
        s.params.mtrr.setup = true;
        s.params.mtrr.pci = true;
        Ok(())
    } },
    Switch { name: "vga", value: Value::None, apply: |s, _| {
        s.params.mtrr.push(MtrrRequest::Add { offset: VGA_WINDOW, size_kb: 128, write_combine: true, uncacheable: false })
    } },
    Switch { name: "wa", value: Value::Required, apply: write_allocate },
    Switch { name: "wahole", value: Value::Required, apply: |s, value| {
        s.forced_hole = Some(parse_bool(value).ok_or(ParamError::InvalidValue("wahole"))?);
        Ok(())
    } },
    Switch { name: "wo", value: Value::Required, apply: write_order },
    Switch { name: "prefetch", value: Value::Required, apply: |s, value| {
        s.require(Capabilities::WRITE_ORDERING, "data prefetch control")?;
        s.params.prefetch = Some(parse_bool(value).ok_or(ParamError::InvalidValue("prefetch"))?);
        Ok(())
    } },
    Switch { name: "l1", value: Value::Required, apply: |s, value| {
        s.params.l1_cache = Some(parse_bool(value).ok_or(ParamError::InvalidValue("l1"))?);
        Ok(())
    } },
    Switch { name: "l2", value: Value::Required, apply: |s, value| {
        s.require(Capabilities::ON_DIE_L2, "L2 cache control")?;
        s.params.l2_cache = Some(parse_bool(value).ok_or(ParamError::InvalidValue("l2"))?);
        Ok(())
    } },
    Switch { name: "multi", value: Value::Required, apply: |s, value| {
        s.params.multiplier = Some(Multiplier::parse(value.trim()).ok_or(ParamError::InvalidValue("multi"))?);
        Ok(())
    } },
    Switch { name: "listbars", value: Value::None, apply: |s, _| { s.params.list_bars = true; Ok(()) } },
];

/// Everything that is safe on this processor: write allocate for all memory, relaxed
/// write ordering, data prefetch, enabled caches and write combining for all frame
/// buffers found.
fn auto_setup(s: &mut ParseState, _: &str) -> Result<()> {
    let sysinfo = s.sysinfo;
    let extended = sysinfo.supports(Capabilities::WRITE_ORDERING);

    s.params.write_allocate = WriteAllocateParams {
        setup: true,
        size_kb: sysinfo.memory_kb,
        hole: sysinfo.memory_hole,
    };
    s.params.write_order = if extended { Some(WriteOrderMode::AllExceptUcWc) } else { None };
    s.params.prefetch = if extended { Some(true) } else { None };
    s.params.l1_cache = Some(true);
    s.params.l2_cache = if sysinfo.supports(Capabilities::ON_DIE_L2) { Some(true) } else { None };
    s.params.mtrr.setup = sysinfo.supports(Capabilities::EXTENDED_MTRR);
    s.params.mtrr.pci = true;
    s.params.mtrr.lfb = true;
    Ok(())
}

/// `offset,size,wc,uc` with the flags being 0 or 1.
fn add_mtrr(s: &mut ParseState, value: &str) -> Result<()> {
    let mut fields = [0_u32; 4];
    let mut parts = value.split(',');
    for field in fields.iter_mut() {
        *field = parts.next()
            .and_then(parse_number)
            .ok_or(ParamError::InvalidValue("mtrr"))?;
    }
    if parts.next().is_some() || fields[2] > 1 || fields[3] > 1 {
        return Err(ParamError::InvalidValue("mtrr"));
    }

    s.params.mtrr.push(MtrrRequest::Add {
        offset: fields[0],
        size_kb: fields[1],
        write_combine: fields[2] == 1,
        uncacheable: fields[3] == 1,
    })
}

/// A size of 0 covers all installed memory.
fn write_allocate(s: &mut ParseState, value: &str) -> Result<()> {
    let size_kb = parse_number(value).ok_or(ParamError::InvalidValue("wa"))?;
    s.params.write_allocate = WriteAllocateParams {
        setup: true,
        size_kb: if size_kb == 0 { s.sysinfo.memory_kb } else { size_kb },
        hole: s.sysinfo.memory_hole,
    };
    Ok(())
}

fn write_order(s: &mut ParseState, value: &str) -> Result<()> {
    s.require(Capabilities::WRITE_ORDERING, "write ordering")?;
    let mode = parse_number(value)
        .filter(|&index| index <= u8::MAX as u32)
        .and_then(|index| WriteOrderMode::from_index(index as u8))
        .ok_or(ParamError::InvalidValue("wo"))?;
    s.params.write_order = Some(mode);
    Ok(())
}

/// Decimal, or hexadecimal with a `0x` prefix.
fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim() {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k6::cpu::{CpuIdentity, VENDOR_AMD};
    use std::vec::Vec;

    fn k6_3() -> SysInfo {
        SysInfo::new(CpuIdentity::new(*VENDOR_AMD, 5, 9, 1), 262144, false, true)
    }

    fn k6() -> SysInfo {
        SysInfo::new(CpuIdentity::new(*VENDOR_AMD, 5, 6, 2), 65536, true, false)
    }

    fn k6_plus() -> SysInfo {
        SysInfo::new(CpuIdentity::new(*VENDOR_AMD, 5, 13, 4), 131072, false, true)
    }

    fn parse(cmdline: &str, sysinfo: &SysInfo) -> Result<Parameters> {
        Parameters::from_cmdline(CmdLine::parse(cmdline), sysinfo)
    }

    #[test]
    fn no_arguments() {
        assert_eq!(parse("", &k6_3()), Err(ParamError::NoArguments));
        assert_eq!(parse("   ", &k6_3()), Err(ParamError::NoArguments));
    }

    #[test]
    fn auto_on_k6_3() {
        let params = parse("/auto", &k6_3()).unwrap();
        assert_eq!(params.write_allocate, WriteAllocateParams { setup: true, size_kb: 262144, hole: false });
        assert_eq!(params.write_order, Some(WriteOrderMode::AllExceptUcWc));
        assert_eq!(params.prefetch, Some(true));
        assert_eq!(params.l1_cache, Some(true));
        assert_eq!(params.l2_cache, Some(true));
        assert_eq!(params.multiplier, None);
        assert!(params.mtrr.setup && params.mtrr.pci && params.mtrr.lfb);
        assert!(!params.chipset);
    }

    #[test]
    fn auto_on_plain_k6() {
        let params = parse("/auto", &k6()).unwrap();
        assert_eq!(params.write_allocate, WriteAllocateParams { setup: true, size_kb: 65536, hole: true });
        assert_eq!(params.write_order, None);
        assert_eq!(params.prefetch, None);
        assert_eq!(params.l1_cache, Some(true));
        assert_eq!(params.l2_cache, None);
        assert!(!params.mtrr.setup);
    }

    #[test]
    fn skip_switches() {
        let params = parse("/AUTO /skippci /SkipWAWO /skipcpu", &k6_3()).unwrap();
        assert!(!params.mtrr.pci);
        assert!(params.mtrr.lfb);
        assert!(!params.write_allocate.setup);
        assert_eq!(params.write_order, None);
        assert_eq!(params.prefetch, None);
        assert_eq!(params.l1_cache, None);
        assert_eq!(params.l2_cache, None);
    }

    #[test]
    fn manual_ranges_keep_their_order() {
        let params = parse("/mtrr:0xE0000000,8192,1,0 /vga /mtrr:3489660928,4096,0,1", &k6_3()).unwrap();
        assert!(params.mtrr.setup);
        let requests: Vec<_> = params.mtrr.requests().cloned().collect();
        assert_eq!(requests, vec![
            MtrrRequest::Add { offset: 0xE000_0000, size_kb: 8192, write_combine: true, uncacheable: false },
            MtrrRequest::Add { offset: 0xA0000, size_kb: 128, write_combine: true, uncacheable: false },
            MtrrRequest::Add { offset: 0xD000_0000, size_kb: 4096, write_combine: false, uncacheable: true },
        ]);
    }

    #[test]
    fn malformed_mtrr() {
        for value in ["0xE0000000,8192,2,0", "0xE0000000,8192,1", "0xE0000000,8192,1,0,0", "0xZZ,8192,1,0", ",,,"].iter() {
            let cmdline = format!("/mtrr:{}", value);
            assert_eq!(parse(&cmdline, &k6_3()), Err(ParamError::InvalidValue("mtrr")), "{}", value);
        }
        assert_eq!(parse("/mtrr", &k6_3()), Err(ParamError::MissingValue("mtrr")));
        assert_eq!(parse("/mtrr:", &k6_3()), Err(ParamError::MissingValue("mtrr")));
    }

    #[test]
    fn request_queue_is_bounded() {
        assert_eq!(parse("/vga /vga /vga /vga /vga", &k6_3()), Err(ParamError::TooManyRegions));
    }

    #[test]
    fn mtrr_clear_is_queued() {
        let params = parse("/mtrrclr", &k6_3()).unwrap();
        assert!(params.mtrr.setup);
        assert_eq!(params.mtrr.requests().next(), Some(&MtrrRequest::Clear));
    }

    #[test]
    fn write_allocate_sizes() {
        let params = parse("/wa:0", &k6()).unwrap();
        assert_eq!(params.write_allocate, WriteAllocateParams { setup: true, size_kb: 65536, hole: true });

        let params = parse("/wa:32768", &k6()).unwrap();
        assert_eq!(params.write_allocate.size_kb, 32768);
        assert_eq!(parse("/wa:lots", &k6()), Err(ParamError::InvalidValue("wa")));
    }

    #[test]
    fn forced_hole_in_any_order() {
        assert_eq!(parse("/wahole:1 /wa:0", &k6_3()).unwrap().write_allocate.hole, true);
        assert_eq!(parse("/wa:0 /wahole:0", &k6()).unwrap().write_allocate.hole, false);
        assert_eq!(parse("/wahole:1", &k6_3()), Err(ParamError::WaHoleWithoutWriteAllocate));
        assert_eq!(parse("/auto /skipwawo /wahole:1", &k6_3()), Err(ParamError::WaHoleWithoutWriteAllocate));
        assert_eq!(parse("/wa:0 /wahole:yes", &k6_3()), Err(ParamError::InvalidValue("wahole")));
    }

    #[test]
    fn write_order_modes() {
        assert_eq!(parse("/wo:2", &k6_3()).unwrap().write_order, Some(WriteOrderMode::None));
        assert_eq!(parse("/wo:3", &k6_3()), Err(ParamError::InvalidValue("wo")));
        assert_eq!(parse("/wo:256", &k6_3()), Err(ParamError::InvalidValue("wo")));
        assert_eq!(parse("/wo:1", &k6()), Err(ParamError::Unsupported("write ordering")));
    }

    #[test]
    fn prefetch() {
        assert_eq!(parse("/prefetch:0", &k6_3()).unwrap().prefetch, Some(false));
        assert_eq!(parse("/prefetch:1", &k6()), Err(ParamError::Unsupported("data prefetch control")));
    }

    #[test]
    fn caches() {
        let params = parse("/l1:0 /l2:1", &k6_3()).unwrap();
        assert_eq!(params.l1_cache, Some(false));
        assert_eq!(params.l2_cache, Some(true));
        assert_eq!(parse("/l1:1", &k6()).unwrap().l1_cache, Some(true));
        assert_eq!(parse("/l2:0", &k6()), Err(ParamError::Unsupported("L2 cache control")));
        assert_eq!(parse("/l1:on", &k6()), Err(ParamError::InvalidValue("l1")));
        // later switches win
        assert_eq!(parse("/auto /l2:0", &k6_3()).unwrap().l2_cache, Some(false));
    }

    #[test]
    fn multiplier() {
        let params = parse("/multi:5.5", &k6_plus()).unwrap();
        assert_eq!(params.multiplier, Multiplier::parse("5.5"));
        // checked when applied, so any processor may ask
        assert!(parse("/multi:4.0", &k6()).unwrap().multiplier.is_some());
        assert_eq!(parse("/multi:5", &k6_plus()), Err(ParamError::InvalidValue("multi")));
        assert_eq!(parse("/multi:7.0", &k6_plus()), Err(ParamError::InvalidValue("multi")));
        assert_eq!(parse("/multi", &k6_plus()), Err(ParamError::MissingValue("multi")));
    }

    #[test]
    fn flags() {
        let params = parse("/quiet /chipset /lfb /listbars /status", &k6_3()).unwrap();
        assert!(params.quiet && params.chipset && params.list_bars && params.status);
        assert!(params.mtrr.setup && params.mtrr.lfb && !params.mtrr.pci);
        assert_eq!(parse("/quiet:1", &k6_3()), Err(ParamError::UnexpectedValue("quiet")));
        assert_eq!(parse("/turbo", &k6_3()), Err(ParamError::UnknownSwitch));
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number("0xA0000"), Some(0xA0000));
        assert_eq!(parse_number("0Xe0000000"), Some(0xE000_0000));
        assert_eq!(parse_number("8192"), Some(8192));
        assert_eq!(parse_number("4294967296"), None);
        assert_eq!(parse_number(""), None);
    }
}
