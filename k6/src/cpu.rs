//! Identification of the K6 family members and what each of them can do.

use core::fmt;
use core::str;

use bare_metal::cpu;
use thiserror::Error;

pub const VENDOR_AMD: &[u8; 12] = b"AuthenticAMD";

const K6_FAMILY: u8 = 5;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuError {
    #[error("not an AMD processor")]
    NotAmd,
    #[error("unsupported processor (family {family} model {model} stepping {stepping})")]
    Unsupported { family: u8, model: u8, stepping: u8 },
}

bitflags! {
    /// Optional features of a K6 family processor.
    pub struct Capabilities : u8 {
        /// EFER write ordering and data prefetch control.
        const WRITE_ORDERING = 1 << 0;
        /// The UWCCR memory type ranges and the CXT write allocate layout.
        const EXTENDED_MTRR  = 1 << 1;
        const ON_DIE_L2      = 1 << 2;
        /// Software controllable clock multiplier.
        const MULTIPLIER     = 1 << 3;
    }
}

/// The K6 family members we know about.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum CpuModel {
    K6,
    K6_2,
    K6_2Cxt,
    K6_3,
    K6Plus,
}

impl CpuModel {
    pub fn name(&self) -> &'static str {
        match self {
            CpuModel::K6 => "AMD K6",
            CpuModel::K6_2 => "AMD K6-2",
            CpuModel::K6_2Cxt => "AMD K6-2 CXT",
            CpuModel::K6_3 => "AMD K6-III",
            CpuModel::K6Plus => "AMD K6-2+/III+",
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        match self {
            CpuModel::K6 => Capabilities::empty(),
            CpuModel::K6_2 => Capabilities::WRITE_ORDERING,
            CpuModel::K6_2Cxt => Capabilities::WRITE_ORDERING | Capabilities::EXTENDED_MTRR,
            CpuModel::K6_3 => Capabilities::WRITE_ORDERING | Capabilities::EXTENDED_MTRR | Capabilities::ON_DIE_L2,
            CpuModel::K6Plus => Capabilities::all(),
        }
    }
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

struct TableRow {
    model: CpuModel,
    matches: fn(model: u8, stepping: u8) -> bool,
}

/// Ordered by model, the first matching row wins.
static MODEL_TABLE: [TableRow; 5] = [
    TableRow { model: CpuModel::K6, matches: |model, _| model == 6 || model == 7 },
    TableRow { model: CpuModel::K6_2, matches: |model, stepping| model == 8 && stepping < 0xC },
    TableRow { model: CpuModel::K6_2Cxt, matches: |model, stepping| model == 8 && stepping == 0xC },
    TableRow { model: CpuModel::K6_3, matches: |model, _| model == 9 },
    TableRow { model: CpuModel::K6Plus, matches: |model, _| model == 0xD },
];

/// Vendor and version information reported by `cpuid`.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct CpuIdentity {
    vendor: [u8; 12],
    pub family: u8,
    pub model: u8,
    pub stepping: u8,
}

impl CpuIdentity {
    pub const fn new(vendor: [u8; 12], family: u8, model: u8, stepping: u8) -> CpuIdentity {
        CpuIdentity { vendor, family, model, stepping }
    }

    /// Query the executing processor.
    pub fn detect() -> CpuIdentity {
        let (_, ebx, ecx, edx) = cpu::cpuid(0);
        let mut vendor = [0_u8; 12];
        vendor[0..4].copy_from_slice(&ebx.to_le_bytes());
        vendor[4..8].copy_from_slice(&edx.to_le_bytes());
        vendor[8..12].copy_from_slice(&ecx.to_le_bytes());

        let (eax, _, _, _) = cpu::cpuid(1);
        let identity = CpuIdentity::new(
            vendor,
            ((eax >> 8) & 0xF) as u8,
            ((eax >> 4) & 0xF) as u8,
            (eax & 0xF) as u8,
        );
        debug!("[cpu] {} family {} model {} stepping {}", identity.vendor(), identity.family, identity.model, identity.stepping);
        identity
    }

    pub fn vendor(&self) -> &str {
        str::from_utf8(&self.vendor).unwrap_or("<invalid>")
    }

    pub fn is_amd(&self) -> bool {
        &self.vendor == VENDOR_AMD
    }

    /// Look up the processor in the model table.
    pub fn classify(&self) -> Result<CpuModel, CpuError> {
        if !self.is_amd() {
            return Err(CpuError::NotAmd);
        }
        let unsupported = CpuError::Unsupported { family: self.family, model: self.model, stepping: self.stepping };
        if self.family != K6_FAMILY {
            return Err(unsupported);
        }
        MODEL_TABLE.iter()
            .find(|row| (row.matches)(self.model, self.stepping))
            .map(|row| row.model)
            .ok_or(unsupported)
    }

    /// Capabilities of this processor, none at all if it is not supported.
    pub fn capabilities(&self) -> Capabilities {
        self.classify()
            .map(|model| model.capabilities())
            .unwrap_or(Capabilities::empty())
    }
}
