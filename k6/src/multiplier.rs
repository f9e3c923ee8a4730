//! Clock multiplier control of the K6-2+/III+ through the enhanced power management
//! block.
//!
//! EPMR maps the block into I/O space. Its bus divisor and voltage control register
//! (BVC) selects the multiplier in a 3 bit field and the core voltage in the 5 bits
//! below it:
//!
//! ```text
//!  12   10  9      7    5 4        0
//! +---+---+---+--+------+----------+
//! | 1 | 1 | 1 |  |  BF  |   VID    |
//! +---+---+---+--+------+----------+
//! ```
//!
//! Writing BVC with bits 12, 10 and 9 set makes the processor switch to the new ratio.

use core::fmt;
use core::ops::RangeInclusive;

use bare_metal::cpu::io::PortNumber;
use bare_metal::cpu::CR0_CD;
use bare_metal::msr::K6_EPMR;
use bare_metal::processor::Processor;
use bare_metal::Bits;

/// Where the power management block is mapped while we use it.
pub const EPM_BASE: PortNumber = PortNumber(0xFFF0);
const EPM_ENABLE: u64 = 1;
const BVC_OFFSET: u16 = 8;

const BVC_VID: RangeInclusive<usize> = 0..=4;
const BVC_BF: RangeInclusive<usize> = 5..=7;
const BVC_SWITCH: u32 = (1 << 12) | (1 << 10) | (1 << 9);

/// The ratio selected by each BF value, in half steps.
const BF_RATIOS: [u8; 8] = [9, 10, 8, 11, 4, 6, 12, 7];

/// A core to bus clock ratio the K6-2+/III+ can switch to.
#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub struct Multiplier {
    bf: u8,
}

impl Multiplier {
    /// Parse a ratio such as `5.5`. Only ratios the BF field can select are accepted.
    pub fn parse(s: &str) -> Option<Multiplier> {
        let halves = match s.as_bytes() {
            [int @ b'0'..=b'9', b'.', b'0'] => (int - b'0') * 2,
            [int @ b'0'..=b'9', b'.', b'5'] => (int - b'0') * 2 + 1,
            _ => return None,
        };
        Multiplier::from_halves(halves)
    }

    fn from_halves(halves: u8) -> Option<Multiplier> {
        BF_RATIOS.iter()
            .position(|&r| r == halves)
            .map(|bf| Multiplier { bf: bf as u8 })
    }

    fn from_bf(bf: u8) -> Multiplier {
        Multiplier { bf: bf & 0b111 }
    }

    /// The ratio times two.
    pub fn halves(&self) -> u8 {
        BF_RATIOS[self.bf as usize]
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let halves = self.halves();
        write!(f, "{}.{}", halves / 2, if halves % 2 == 1 { 5 } else { 0 })
    }
}

fn with_epm_block<C: Processor + ?Sized, R>(cpu: &mut C, f: impl FnOnce(&mut C, PortNumber) -> R) -> R {
    cpu.write(K6_EPMR, EPM_BASE.0 as u64 | EPM_ENABLE);
    let result = f(cpu, EPM_BASE + BVC_OFFSET);
    cpu.write(K6_EPMR, EPM_BASE.0 as u64);
    result
}

/// The ratio the processor is currently running at.
pub fn read<C: Processor + ?Sized>(cpu: &mut C) -> Multiplier {
    let bvc = with_epm_block(cpu, |cpu, bvc| cpu.read_port(bvc));
    Multiplier::from_bf(bvc.get_bits(BVC_BF) as u8)
}

/// Switch to `ratio`, keeping the core voltage. The caches are off during the switch.
pub fn set<C: Processor + ?Sized>(cpu: &mut C, ratio: Multiplier) {
    let cr0 = cpu.read_cr0();
    cpu.write_cr0(cr0 | CR0_CD);

    with_epm_block(cpu, |cpu, port| {
        let current = cpu.read_port(port);
        let mut bvc = BVC_SWITCH;
        bvc.set_bits(BVC_VID, current.get_bits(BVC_VID));
        bvc.set_bits(BVC_BF, ratio.bf as u32);
        debug!("[multiplier] {}x, writing BVC {:#06x}", ratio, bvc);
        cpu.write_port(port, bvc);
    });

    cpu.write_cr0(cr0);
}

#[cfg(test)]
mod test {
    use super::*;
    use bare_metal::processor::mock::{RecordingCpu, Write};

    const BVC: PortNumber = PortNumber(0xFFF8);

    #[test]
    fn parse_ratios() {
        assert_eq!(Multiplier::parse("5.5").map(|m| m.halves()), Some(11));
        assert_eq!(Multiplier::parse("2.0").map(|m| m.halves()), Some(4));
        assert_eq!(Multiplier::parse("6.0").map(|m| m.halves()), Some(12));
        // not selectable
        assert_eq!(Multiplier::parse("2.5"), None);
        assert_eq!(Multiplier::parse("7.0"), None);
        // malformed
        assert_eq!(Multiplier::parse("5"), None);
        assert_eq!(Multiplier::parse("5.25"), None);
        assert_eq!(Multiplier::parse("5,5"), None);
        assert_eq!(Multiplier::parse("x.5"), None);
    }

    #[test]
    fn display() {
        assert_eq!(format!("{}", Multiplier::parse("4.5").unwrap()), "4.5");
        assert_eq!(format!("{}", Multiplier::parse("3.0").unwrap()), "3.0");
    }

    #[test]
    fn switch_sequence() {
        // running at 4.5x (BF 0) with VID 0x0B
        let mut cpu = RecordingCpu::new().with_cr0(0x11).with_port(BVC, 0x000B);
        set(&mut cpu, Multiplier::parse("5.5").unwrap());

        let writes: Vec<_> = cpu.writes().copied().collect();
        assert_eq!(writes, vec![
            Write::Cr0(0x11 | CR0_CD),
            Write::Msr { msr: K6_EPMR, value: 0xFFF1, cache_control: false },
            Write::Port(BVC, 0x1600 | (3 << 5) | 0x0B),
            Write::Msr { msr: K6_EPMR, value: 0xFFF0, cache_control: false },
            Write::Cr0(0x11),
        ]);
        assert_eq!(read(&mut cpu).halves(), 11);
    }
}
