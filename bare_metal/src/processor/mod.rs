//! Everything configuration code may change on the executing processor, behind traits
//! so it can run against the recording double in `mock`.

use crate::cpu::{self, io, io::PortNumber};
use crate::msr::{Msr, MsrAccess};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// Processor state outside the model specific registers.
pub trait ControlAccess {
    fn read_cr0(&mut self) -> usize;
    /// Change CR0. Caches are written back and invalidated around the change.
    fn write_cr0(&mut self, value: usize);

    /// 32 bit access to on-chip I/O blocks, such as the power management block of
    /// the K6-2+/III+.
    fn read_port(&mut self, port: PortNumber) -> u32;
    fn write_port(&mut self, port: PortNumber, value: u32);
}

/// The complete processor interface.
pub trait Processor: MsrAccess + ControlAccess {}

impl<T: MsrAccess + ControlAccess + ?Sized> Processor for T {}

/// [`Processor`] implemented by the executing processor.
#[derive(Debug)]
pub struct Hardware(());

impl Hardware {
    /// The caller must ensure we are running at CPL 0, outside of virtual 8086 mode,
    /// and that the registers used exist on this processor.
    pub const unsafe fn new() -> Hardware {
        Hardware(())
    }
}

impl MsrAccess for Hardware {
    fn read(&mut self, msr: Msr) -> u64 {
        unsafe { msr.read() }
    }

    fn write(&mut self, msr: Msr, value: u64) {
        unsafe { msr.write(value) }
    }

    fn write_cache_control(&mut self, msr: Msr, value: u64) {
        unsafe {
            let _irq = cpu::InterruptGuard::new();
            cpu::wbinvd();
            msr.write(value);
            cpu::wbinvd();
        }
    }
}

impl ControlAccess for Hardware {
    fn read_cr0(&mut self) -> usize {
        unsafe { cpu::read_cr0() }
    }

    fn write_cr0(&mut self, value: usize) {
        unsafe {
            let _irq = cpu::InterruptGuard::new();
            cpu::wbinvd();
            cpu::write_cr0(value);
            cpu::wbinvd();
        }
    }

    fn read_port(&mut self, port: PortNumber) -> u32 {
        unsafe { io::inl(port) }
    }

    fn write_port(&mut self, port: PortNumber, value: u32) {
        unsafe { io::outl(port, value) }
    }
}
