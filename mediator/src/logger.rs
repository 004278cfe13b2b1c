//! Stderr logger behind the `log` facade.

use conquer_once::spin::OnceCell;
use log::{LevelFilter, Log, Metadata, Record};

static LOGGER: OnceCell<StderrLogger> = OnceCell::uninit();

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:>5}] {}: {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

/// Install the process-wide logger. Safe to call more than once; only the
/// first call takes effect.
pub fn init(level: LevelFilter) {
    LOGGER.init_once(|| StderrLogger { level });
    if let Ok(logger) = LOGGER.try_get() {
        let _ = log::set_logger(logger);
        log::set_max_level(level);
    }
}
