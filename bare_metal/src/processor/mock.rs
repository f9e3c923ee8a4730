//! A processor in memory that remembers every write.

use crate::cpu::io::PortNumber;
use crate::msr::{Msr, MsrAccess};

use super::ControlAccess;

pub const MAX_REGISTERS: usize = 8;
pub const MAX_WRITES: usize = 16;
pub const MAX_PORTS: usize = 4;

#[derive(Eq, PartialEq, Copy, Clone, Debug)]
pub enum Write {
    Msr {
        msr: Msr,
        value: u64,
        /// Whether the write went through [`MsrAccess::write_cache_control`].
        cache_control: bool,
    },
    Cr0(usize),
    Port(PortNumber, u32),
}

#[derive(Clone, Debug, Default)]
pub struct RecordingCpu {
    registers: [Option<(Msr, u64)>; MAX_REGISTERS],
    ports: [Option<(PortNumber, u32)>; MAX_PORTS],
    cr0: usize,
    writes: [Option<Write>; MAX_WRITES],
    write_count: usize,
}

impl RecordingCpu {
    pub fn new() -> RecordingCpu {
        RecordingCpu::default()
    }

    /// Preload `msr` with `value`.
    pub fn with(mut self, msr: Msr, value: u64) -> RecordingCpu {
        self.store(msr, value);
        self
    }

    /// Preload what reading `port` returns.
    pub fn with_port(mut self, port: PortNumber, value: u32) -> RecordingCpu {
        self.store_port(port, value);
        self
    }

    pub fn with_cr0(mut self, cr0: usize) -> RecordingCpu {
        self.cr0 = cr0;
        self
    }

    /// Current value of `msr`, zero if it was never written.
    pub fn value(&self, msr: Msr) -> u64 {
        self.registers.iter()
            .flatten()
            .find(|(reg, _)| *reg == msr)
            .map_or(0, |(_, value)| *value)
    }

    pub fn port(&self, port: PortNumber) -> u32 {
        self.ports.iter()
            .flatten()
            .find(|(p, _)| *p == port)
            .map_or(0, |(_, value)| *value)
    }

    pub fn cr0(&self) -> usize {
        self.cr0
    }

    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// All recorded writes in the order they were issued.
    pub fn writes(&self) -> impl Iterator<Item = &Write> {
        self.writes.iter().flatten()
    }

    /// The model specific register writes as `(msr, value, cache_control)`.
    pub fn msr_writes(&self) -> impl Iterator<Item = (Msr, u64, bool)> + '_ {
        self.writes().filter_map(|w| match *w {
            Write::Msr { msr, value, cache_control } => Some((msr, value, cache_control)),
            _ => None,
        })
    }

    fn store(&mut self, msr: Msr, value: u64) {
        let slot = self.registers.iter()
            .position(|r| r.map_or(true, |(reg, _)| reg == msr))
            .expect("too many registers in use");
        self.registers[slot] = Some((msr, value));
    }

    fn store_port(&mut self, port: PortNumber, value: u32) {
        let slot = self.ports.iter()
            .position(|r| r.map_or(true, |(p, _)| p == port))
            .expect("too many ports in use");
        self.ports[slot] = Some((port, value));
    }

    fn record(&mut self, write: Write) {
        if let Some(slot) = self.writes.get_mut(self.write_count) {
            *slot = Some(write);
        }
        self.write_count += 1;
    }
}

impl MsrAccess for RecordingCpu {
    fn read(&mut self, msr: Msr) -> u64 {
        self.value(msr)
    }

    fn write(&mut self, msr: Msr, value: u64) {
        self.store(msr, value);
        self.record(Write::Msr { msr, value, cache_control: false });
    }

    fn write_cache_control(&mut self, msr: Msr, value: u64) {
        self.store(msr, value);
        self.record(Write::Msr { msr, value, cache_control: true });
    }
}

impl ControlAccess for RecordingCpu {
    fn read_cr0(&mut self) -> usize {
        self.cr0
    }

    fn write_cr0(&mut self, value: usize) {
        self.cr0 = value;
        self.record(Write::Cr0(value));
    }

    fn read_port(&mut self, port: PortNumber) -> u32 {
        self.port(port)
    }

    fn write_port(&mut self, port: PortNumber, value: u32) {
        self.store_port(port, value);
        self.record(Write::Port(port, value));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cpu::CR0_CD;
    use crate::msr::{K6_EFER, K6_UWCCR};

    #[test]
    fn records_writes_in_order() {
        let mut cpu = RecordingCpu::new().with(K6_EFER, 0x2).with_cr0(0x11);
        assert_eq!(cpu.read(K6_EFER), 0x2);
        assert_eq!(cpu.read(K6_UWCCR), 0);
        assert_eq!(cpu.read_cr0(), 0x11);

        cpu.write(K6_EFER, 0x6);
        cpu.write_cache_control(K6_UWCCR, 0xE000_0002);
        cpu.write_cr0(0x11 | CR0_CD);
        cpu.write_port(PortNumber(0xFFF8), 0x1600);

        let writes: Vec<_> = cpu.writes().copied().collect();
        assert_eq!(writes, vec![
            Write::Msr { msr: K6_EFER, value: 0x6, cache_control: false },
            Write::Msr { msr: K6_UWCCR, value: 0xE000_0002, cache_control: true },
            Write::Cr0(0x11 | CR0_CD),
            Write::Port(PortNumber(0xFFF8), 0x1600),
        ]);
        assert_eq!(cpu.value(K6_EFER), 0x6);
        assert_eq!(cpu.port(PortNumber(0xFFF8)), 0x1600);
        assert_eq!(cpu.msr_writes().count(), 2);
        assert_eq!(cpu.write_count(), 4);
    }
}
