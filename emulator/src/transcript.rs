use std::cell::RefCell;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use mode_core::LogSink;

pub type SharedTranscript = Rc<RefCell<TranscriptLogger>>;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}

/// Timestamped record of a session, optionally mirrored to a file.
///
/// Device log lines are also queued for the console until
/// [`take_output`](Self::take_output) collects them.
pub struct TranscriptLogger {
    writer: Option<BufWriter<File>>,
    pending: Vec<String>,
    clock: Duration,
}

impl TranscriptLogger {
    pub fn in_memory() -> Self {
        Self {
            writer: None,
            pending: Vec::new(),
            clock: Duration::ZERO,
        }
    }

    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: Some(BufWriter::new(file)),
            ..Self::in_memory()
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writeln!(writer, "# Odometer emulator transcript")?;
        writeln!(writer, "# Timestamps are milliseconds of scheduler time")?;
        writeln!(writer)?;
        writer.flush()
    }

    /// Sets the timestamp applied to the following lines.
    pub fn set_clock(&mut self, now: Duration) {
        self.clock = now;
    }

    pub fn clock(&self) -> Duration {
        self.clock
    }

    pub fn append_line(&mut self, role: TranscriptRole, line: &str) -> io::Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        writeln!(
            writer,
            "[+{:>6} ms] {} {}",
            self.clock.as_millis(),
            role.prefix(),
            line
        )?;
        writer.flush()
    }

    /// Records a device log line and queues it for the console.
    pub fn record(&mut self, source: &str, line: &str) {
        let line = format!("[{source}] {line}");
        if let Err(err) = self.append_line(TranscriptRole::Emulator, &line) {
            log::warn!("transcript write failed: {err}");
        }
        self.pending.push(line);
    }

    /// Drains the device lines recorded since the last call.
    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending)
    }
}

/// Log sink forwarding a scheduler's lines into the transcript under `source`.
pub fn prefixed_sink(source: &'static str, transcript: &SharedTranscript) -> Box<dyn LogSink> {
    let transcript = Rc::clone(transcript);
    Box::new(move |line: &str| transcript.borrow_mut().record(source, line))
}
