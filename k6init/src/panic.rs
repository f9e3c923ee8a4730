#[cfg(not(test))]
use core::fmt::Write;
#[cfg(not(test))]
use core::panic::PanicInfo;
#[cfg(not(test))]
use bare_metal::cpu;

#[panic_handler]
#[cfg(not(test))]
fn panic(panic_info: &PanicInfo) -> ! {
    // the logger may have been holding the port when we panicked
    match crate::logger::COM1.try_lock() {
        Some(mut com1) => {
            let _ = writeln!(com1, "{}", panic_info);
        }
        None => {
            let mut com1 = unsafe { cpu::io::com::SerialPort::new(cpu::io::com::COM1_ADDR) };
            let _ = writeln!(com1, "{}", panic_info);
        }
    }

    unsafe {
        let _irq = cpu::InterruptGuard::new();
        cpu::hang()
    }
}
