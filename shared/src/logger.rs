use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Where formatted log lines end up, e.g. the serial port.
pub type LogSink = fn(core::fmt::Arguments);

/// A `log::Log` implementation that formats records straight into a sink,
/// without allocating.
pub struct KernelLogger {
    max_level: LevelFilter,
    sink: LogSink,
}

impl KernelLogger {
    pub const fn new(max_level: LevelFilter, sink: LogSink) -> Self {
        Self { max_level, sink }
    }

    /// Call this once during early init. The logger must live in a static.
    pub fn init(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.max_level);
        Ok(())
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        (self.sink)(format_args!(
            "[{}] {}: {}\n",
            record.level(),
            record.target(),
            record.args()
        ));
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::fmt::Write;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use log::Level;

    static LINES: AtomicUsize = AtomicUsize::new(0);
    static LAST_LEN: AtomicUsize = AtomicUsize::new(0);

    struct Counter(usize);

    impl Write for Counter {
        fn write_str(&mut self, s: &str) -> core::fmt::Result {
            self.0 += s.len();
            Ok(())
        }
    }

    fn counting_sink(args: core::fmt::Arguments) {
        let mut counter = Counter(0);
        let _ = counter.write_fmt(args);
        LINES.fetch_add(1, Ordering::SeqCst);
        LAST_LEN.store(counter.0, Ordering::SeqCst);
    }

    #[test]
    fn filters_by_level() {
        let logger = KernelLogger::new(LevelFilter::Info, counting_sink);
        let before = LINES.load(Ordering::SeqCst);

        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("mem")
                .args(format_args!("dropped"))
                .build(),
        );
        assert_eq!(LINES.load(Ordering::SeqCst), before);

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("mem")
                .args(format_args!("swap full"))
                .build(),
        );
        assert_eq!(LINES.load(Ordering::SeqCst), before + 1);
        assert_eq!(LAST_LEN.load(Ordering::SeqCst), "[WARN] mem: swap full\n".len());
    }
}
