//! Facts about the machine, collected once before anything is configured.

use crate::cpu::{Capabilities, CpuIdentity, CpuModel};
use crate::whcr::WhcrLayout;

#[derive(Eq, PartialEq, Clone, Debug)]
pub struct SysInfo {
    pub cpu: CpuIdentity,
    /// `None` for processors outside the model table.
    pub model: Option<CpuModel>,
    pub capabilities: Capabilities,
    /// Installed memory.
    pub memory_kb: u32,
    /// Whether the board has a memory hole at 15-16 MiB.
    pub memory_hole: bool,
    pub vesa_present: bool,
}

impl SysInfo {
    pub fn new(cpu: CpuIdentity, memory_kb: u32, memory_hole: bool, vesa_present: bool) -> SysInfo {
        let model = cpu.classify().ok();
        SysInfo {
            cpu,
            model,
            capabilities: model.map_or(Capabilities::empty(), |m| m.capabilities()),
            memory_kb,
            memory_hole,
            vesa_present,
        }
    }

    pub fn supports(&self, capabilities: Capabilities) -> bool {
        self.capabilities.contains(capabilities)
    }

    pub fn whcr_layout(&self) -> WhcrLayout {
        WhcrLayout::for_cpu(&self.cpu)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cpu::VENDOR_AMD;

    #[test]
    fn capabilities_follow_model() {
        let info = SysInfo::new(CpuIdentity::new(*VENDOR_AMD, 5, 9, 1), 65536, false, true);
        assert_eq!(info.model, Some(CpuModel::K6_3));
        assert!(info.supports(Capabilities::EXTENDED_MTRR | Capabilities::ON_DIE_L2));
        assert!(!info.supports(Capabilities::MULTIPLIER));
        assert_eq!(info.whcr_layout(), WhcrLayout::Cxt);
    }

    #[test]
    fn unsupported_cpu_has_nothing() {
        let info = SysInfo::new(CpuIdentity::new(*b"CyrixInstead", 5, 2, 0), 32768, true, false);
        assert_eq!(info.model, None);
        assert_eq!(info.capabilities, Capabilities::empty());
        assert!(!info.supports(Capabilities::WRITE_ORDERING));
    }
}
