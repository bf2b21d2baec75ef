//! `log` backend writing to the MSIM printer MMIO register. Registered
//! once at boot so the rest of the kernel can use `log::info!`/`warn!`/
//! `debug!` the way the teacher's subsystems do, instead of hand-rolled
//! `printer_putchar` calls scattered through the core.

use core::fmt::Write;

use log::{Level, LevelFilter, Log, Metadata, Record};

struct Printer;

impl Write for Printer {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for b in s.bytes() {
            crate::arch::printer_putchar(b);
        }
        Ok(())
    }
}

struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _guard = crate::arch::InterruptGuard::new();
        let _ = writeln!(Printer, "[{:<5} {}] {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// Installs the kernel logger. Idempotent in spirit but not in fact:
/// calling it twice panics, same as `log::set_logger` itself.
pub fn init() {
    log::set_logger(&LOGGER).expect("klog::init called more than once");
    log::set_max_level(LevelFilter::Debug);
}
