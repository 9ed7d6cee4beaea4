use log::{LevelFilter, Metadata, Record};
use std::sync::Once;

pub struct BridgeLogger {
    level: LevelFilter,
}

impl log::Log for BridgeLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static INIT: Once = Once::new();

/// Installs the crate's logger as the global `log` sink. Idempotent: later
/// calls after the first are no-ops.
pub fn init_logger(debug: bool) {
    let level = if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    INIT.call_once(|| {
        let logger = BridgeLogger { level };
        log::set_boxed_logger(Box::new(logger)).unwrap();
        log::set_max_level(level);
    });
}
