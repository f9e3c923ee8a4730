//! `log` backend writing to the first serial port.

use core::fmt::{self, Write};

use bare_metal::cpu::io::com::{SerialPort, COM1_ADDR};
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Mutex;

pub static COM1: Mutex<SerialPort> = Mutex::new(unsafe { SerialPort::new(COM1_ADDR) });

static LOGGER: SerialLogger = SerialLogger;

pub struct SerialLogger;

impl Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut com1 = COM1.lock();
            // nowhere to report a failing serial port
            let _ = write_record(&mut *com1, record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn write_record<W: Write + ?Sized>(out: &mut W, level: Level, args: &fmt::Arguments) -> fmt::Result {
    let label = match level {
        Level::Error => "ERROR",
        Level::Warn => "WARNING",
        Level::Info => "INFO",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    };
    writeln!(out, "[{}] {}", label, args)
}

/// Install the serial logger. Everything up to `Info` is shown until [`set_quiet`] says otherwise.
pub fn init() -> Result<(), SetLoggerError> {
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Info);
    Ok(())
}

/// In quiet mode only warnings and errors get through.
pub fn set_quiet(quiet: bool) {
    log::set_max_level(if quiet { LevelFilter::Warn } else { LevelFilter::Info });
}
