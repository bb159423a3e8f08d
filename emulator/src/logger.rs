//! `log` backend printing scheduler diagnostics to stderr.

use std::io::{self, Write};
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Metadata, Record, SetLoggerError};

struct StderrLogger {
    started: Instant,
}

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        // Raw terminal mode needs the explicit carriage return.
        let _ = write!(
            io::stderr().lock(),
            "{:>5} [+{:>6} ms] {} - {}\r\n",
            record.level(),
            self.started.elapsed().as_millis(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = io::stderr().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Installs the stderr logger at `level`.
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    let logger = LOGGER.get_or_init(|| StderrLogger {
        started: Instant::now(),
    });
    log::set_logger(logger).map(|()| log::set_max_level(level))
}
