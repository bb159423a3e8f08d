mod logger;
mod odometer;
mod render;
mod sensors;
mod session;
mod terminal;
mod transcript;

use std::cell::RefCell;
use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::time::Duration;

use log::LevelFilter;
use mode_core::console::grammar::parse_duration;
use mode_core::{DEFAULT_TICK_INTERVAL, SchedulerConfig};

use session::Session;
use transcript::TranscriptLogger;

const USAGE: &str =
    "Usage: odometer-emulator [--live] [--tick <duration>] [--transcript <path>] [--verbose]";

struct Options {
    live: bool,
    tick: Duration,
    transcript: Option<PathBuf>,
    verbose: bool,
}

fn main() -> io::Result<()> {
    let options = parse_options(env::args().skip(1)).unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    if options.verbose {
        if let Err(err) = logger::init(LevelFilter::Debug) {
            eprintln!("logging unavailable: {err}");
        }
    }

    let transcript = match &options.transcript {
        Some(path) => TranscriptLogger::create(path)?,
        None => TranscriptLogger::in_memory(),
    };
    let config = SchedulerConfig::new(options.tick);

    if options.live {
        return terminal::run_live(config, &Rc::new(RefCell::new(transcript)));
    }
    run_console(config, transcript)
}

fn run_console(config: SchedulerConfig, transcript: TranscriptLogger) -> io::Result<()> {
    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut writer = stdout.lock();
    let mut session = Session::new(config, transcript)?;
    let mut line = String::new();

    writeln!(
        writer,
        "Odometer emulator ready. Type `help` for commands or `quit` to leave."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        for response in session.handle_command(trimmed)? {
            writeln!(writer, "{response}")?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("quit")
}

fn parse_options(args: impl Iterator<Item = String>) -> Result<Options, String> {
    let mut options = Options {
        live: false,
        tick: DEFAULT_TICK_INTERVAL,
        transcript: None,
        verbose: false,
    };
    let mut args = args.peekable();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--live" => options.live = true,
            "--verbose" | "-v" => options.verbose = true,
            "--tick" => {
                let value = args.next().ok_or("Expected value after --tick")?;
                options.tick = parse_tick(&value)?;
            }
            "--transcript" => {
                let value = args.next().ok_or("Expected value after --transcript")?;
                options.transcript = Some(PathBuf::from(value));
            }
            other => {
                if let Some(value) = other.strip_prefix("--tick=") {
                    options.tick = parse_tick(value)?;
                } else if let Some(value) = other.strip_prefix("--transcript=") {
                    options.transcript = Some(PathBuf::from(value));
                } else {
                    return Err(format!("Unknown argument `{other}`"));
                }
            }
        }
    }
    Ok(options)
}

fn parse_tick(value: &str) -> Result<Duration, String> {
    match parse_duration(value) {
        Some(tick) if !tick.is_zero() => Ok(tick),
        _ => Err(format!("Invalid tick interval `{value}`, expected e.g. 100ms or 1s")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Options, String> {
        parse_options(args.iter().map(|arg| (*arg).to_owned()))
    }

    #[test]
    fn defaults_to_console_mode() {
        let options = parse(&[]).expect("parses");
        assert!(!options.live);
        assert!(!options.verbose);
        assert_eq!(options.tick, DEFAULT_TICK_INTERVAL);
        assert!(options.transcript.is_none());
    }

    #[test]
    fn accepts_both_flag_spellings() {
        let options = parse(&["--live", "--tick", "250ms", "--transcript=out/run.log"])
            .expect("parses");
        assert!(options.live);
        assert_eq!(options.tick, Duration::from_millis(250));
        assert_eq!(options.transcript, Some(PathBuf::from("out/run.log")));
    }

    #[test]
    fn rejects_bad_arguments() {
        assert!(parse(&["--tick"]).is_err());
        assert!(parse(&["--tick", "0ms"]).is_err());
        assert!(parse(&["--tick=fast"]).is_err());
        assert!(parse(&["--profile"]).is_err());
    }
}
