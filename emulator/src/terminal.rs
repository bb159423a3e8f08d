//! Real-time loop with raw-mode keyboard polling.

use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use mode_core::{Key, SchedulerConfig};

use crate::odometer::Odometer;
use crate::transcript::SharedTranscript;

const LIVE_HELP: &str =
    "live: p pause, z reset, q reboot, Esc exit | t track, g grabber, r recorder, c calibrate";

/// Non-blocking read of the next key press.
pub fn poll_key() -> Option<Key> {
    match event::poll(Duration::ZERO) {
        Ok(true) => {}
        Ok(false) => return None,
        Err(err) => {
            log::warn!("keyboard poll failed: {err}");
            return None;
        }
    }
    match event::read() {
        Ok(Event::Key(key)) => translate(key),
        Ok(_) => None,
        Err(err) => {
            log::warn!("keyboard read failed: {err}");
            None
        }
    }
}

fn translate(event: KeyEvent) -> Option<Key> {
    if event.kind == KeyEventKind::Release {
        return None;
    }
    match event.code {
        // Raw mode swallows SIGINT.
        KeyCode::Char('c') if event.modifiers.contains(KeyModifiers::CONTROL) => Some(Key::Escape),
        KeyCode::Char(c) => Some(Key::Char(c)),
        KeyCode::Enter => Some(Key::Enter),
        KeyCode::Esc => Some(Key::Escape),
        _ => None,
    }
}

struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        if let Err(err) = terminal::disable_raw_mode() {
            log::warn!("failed to restore terminal: {err}");
        }
    }
}

/// Ticks the odometer on wall-clock time until every mode has ended.
pub fn run_live(config: SchedulerConfig, transcript: &SharedTranscript) -> io::Result<()> {
    let mut odometer =
        Odometer::new(config, transcript).map_err(|err| io::Error::other(err.to_string()))?;
    odometer.scheduler_mut().set_input(Box::new(poll_key));

    let _raw = RawMode::enable()?;
    let mut out = io::stdout().lock();
    write!(out, "{LIVE_HELP}\r\n")?;

    let idle = (config.min_tick_interval() / 4).max(Duration::from_millis(1));
    let started = Instant::now();
    loop {
        let now = started.elapsed();
        transcript.borrow_mut().set_clock(now);
        if odometer.tick(now) {
            for line in transcript.borrow_mut().take_output() {
                write!(out, "{line}\r\n")?;
            }
            out.flush()?;
        }
        if odometer.is_complete() {
            break;
        }
        thread::sleep(idle);
    }

    odometer.flush_logs();
    for line in transcript.borrow_mut().take_output() {
        write!(out, "{line}\r\n")?;
    }
    out.flush()
}
