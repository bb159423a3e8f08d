use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use mode_core::console::{
    self, Action, COMMAND_HELP, Command, CommandError, ModeDirectory, Target, TickCommand,
};
use mode_core::{ModeControl, Scheduler, SchedulerConfig, SystemHooks};

use crate::odometer::Odometer;
use crate::render::format_duration_short;
use crate::transcript::{SharedTranscript, TranscriptLogger, TranscriptRole};

/// Device a console command is applied to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Route {
    Odometer,
    Camera,
    Imu,
}

/// Line-oriented console over the odometer on a simulated clock.
///
/// Time only moves when a `tick` command runs, so transcripts are
/// reproducible.
pub struct Session {
    odometer: Odometer,
    transcript: SharedTranscript,
    tick_interval: Duration,
    next_tick: Duration,
}

impl Session {
    pub fn new(config: SchedulerConfig, transcript: TranscriptLogger) -> io::Result<Self> {
        let transcript = Rc::new(RefCell::new(transcript));
        let odometer =
            Odometer::new(config, &transcript).map_err(|err| io::Error::other(err.to_string()))?;
        Ok(Self {
            odometer,
            transcript,
            tick_interval: config.min_tick_interval(),
            next_tick: Duration::ZERO,
        })
    }

    pub fn odometer(&self) -> &Odometer {
        &self.odometer
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.transcript.borrow_mut().set_clock(self.next_tick);
        self.transcript
            .borrow_mut()
            .append_line(TranscriptRole::Host, trimmed)?;

        let command = match console::parse(trimmed) {
            Ok(command) => command,
            Err(err) => return self.respond(vec![format!("ERR syntax {err}")]),
        };
        let route = self.route(&command);
        let result = match route {
            Route::Odometer => self.odometer.execute(command),
            Route::Camera => self.odometer.sensors().borrow_mut().camera.execute(command),
            Route::Imu => self.odometer.sensors().borrow_mut().imu.execute(command),
        };

        let lines = match result {
            Ok(Action::Requested) => vec![format!("OK {trimmed} queued on {}", route.name())],
            Ok(Action::Tick(tick)) => self.run_ticks(tick),
            Ok(Action::Status) => self.status(),
            Ok(Action::Help(topic)) => help(topic),
            Err(CommandError::Parse(err)) => vec![format!("ERR syntax {err}")],
            Err(err) => vec![format!("ERR {err}")],
        };
        self.respond(lines)
    }

    fn respond(&mut self, lines: Vec<String>) -> io::Result<Vec<String>> {
        let mut transcript = self.transcript.borrow_mut();
        for line in &lines {
            transcript.append_line(TranscriptRole::Emulator, line)?;
        }
        Ok(lines)
    }

    // Names are looked up on the odometer first, then on each sensor.
    fn route(&self, command: &Command<'_>) -> Route {
        let (Command::Begin(Target::Name(name))
        | Command::Stop(Target::Name(name))
        | Command::Only(Target::Name(name))) = command
        else {
            return Route::Odometer;
        };
        let sensors = self.odometer.sensors().borrow();
        if self.odometer.directory().lookup(name).is_some() {
            Route::Odometer
        } else if sensors.camera.directory().lookup(name).is_some() {
            Route::Camera
        } else if sensors.imu.directory().lookup(name).is_some() {
            Route::Imu
        } else {
            Route::Odometer
        }
    }

    fn run_ticks(&mut self, tick: TickCommand) -> Vec<String> {
        let count = tick.count.unwrap_or(1);
        let every = tick.every.unwrap_or(self.tick_interval);
        let mut ran = 0_u32;
        for _ in 0..count {
            self.transcript.borrow_mut().set_clock(self.next_tick);
            if self.odometer.tick(self.next_tick) {
                ran += 1;
            }
            self.next_tick += every;
        }
        self.odometer.flush_logs();

        let mut lines = self.transcript.borrow_mut().take_output();
        let uptime = self.odometer.scheduler().uptime();
        lines.push(format!(
            "OK ran {ran}/{count} ticks uptime={}",
            format_duration_short(uptime)
        ));
        if ran < count {
            lines.push(format!(
                "{} ticks skipped, interval below {}",
                count - ran,
                format_duration_short(self.tick_interval)
            ));
        }
        if self.odometer.is_complete() {
            lines.push("odometer idle".to_owned());
        }
        lines
    }

    fn status(&self) -> Vec<String> {
        let odometer = self.odometer.scheduler();
        let sensors = self.odometer.sensors().borrow();
        let camera = sensors.camera.sensor().borrow();
        let imu = sensors.imu.sensor().borrow();
        vec![
            format!(
                "ticks={} uptime={} paused={}",
                odometer.tick_count(),
                format_duration_short(odometer.uptime()),
                odometer.is_paused()
            ),
            describe("odometer", odometer, self.odometer.directory()),
            describe(
                "camera",
                sensors.camera.scheduler(),
                sensors.camera.directory(),
            ),
            describe("imu", sensors.imu.scheduler(), sensors.imu.directory()),
            format!(
                "camera: frame={} recorded={} calibrated={} reboots={}",
                camera.frame, camera.recorded, camera.calibrated, camera.reboots
            ),
            format!(
                "imu: samples={} distance={:.2}m reboots={}",
                imu.samples, imu.distance, imu.reboots
            ),
        ]
    }
}

impl Route {
    fn name(self) -> &'static str {
        match self {
            Route::Odometer => "odometer",
            Route::Camera => "camera",
            Route::Imu => "imu",
        }
    }
}

fn describe<H: SystemHooks>(
    label: &str,
    scheduler: &Scheduler<Duration, H>,
    directory: &ModeDirectory,
) -> String {
    let name = |id| {
        directory
            .name_of(id)
            .map_or_else(|| id.to_string(), str::to_owned)
    };
    let active: Vec<String> = scheduler
        .active_modes()
        .map(|id| {
            let time = format_duration_short(scheduler.active_time(id));
            format!("{}({time})", name(id))
        })
        .collect();
    let pending: Vec<String> = scheduler
        .registered_modes()
        .filter_map(|id| {
            scheduler
                .pending_phase(id)
                .map(|phase| format!("{}:{phase}", name(id)))
        })
        .collect();
    format!(
        "{label}: active [{}] pending [{}]",
        active.join(", "),
        pending.join(", ")
    )
}

fn help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some(usage) = console::help_for(target) {
                lines.push(usage.to_owned());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_owned());
            for (_, usage) in COMMAND_HELP {
                lines.push(format!("  {usage}"));
            }
            lines.push("  quit                    leave the emulator".to_owned());
            lines.push("Modes: track, frame-grabber, recorder, calibrator, imu-reader".to_owned());
        }
    }
    lines
}

fn help_topic_list() -> String {
    COMMAND_HELP
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new(
            SchedulerConfig::new(Duration::from_millis(100)),
            TranscriptLogger::in_memory(),
        )
        .expect("session starts")
    }

    fn run(session: &mut Session, line: &str) -> Vec<String> {
        session.handle_command(line).expect("command runs")
    }

    #[test]
    fn startup_reaches_tracking() {
        let mut session = session();
        let lines = run(&mut session, "tick 12");
        assert!(lines.iter().any(|line| line == "[odometer] sensors ready, tracking"));
        assert_eq!(
            lines.last().map(String::as_str),
            Some("OK ran 12/12 ticks uptime=1.100s")
        );

        let status = run(&mut session, "status");
        assert!(status[1].starts_with("odometer: active [track("));
    }

    #[test]
    fn names_route_to_the_owning_device() {
        let mut session = session();
        run(&mut session, "tick 13");

        assert_eq!(
            run(&mut session, "begin calibrator"),
            ["OK begin calibrator queued on camera"]
        );
        assert_eq!(
            run(&mut session, "stop imu-reader"),
            ["OK stop imu-reader queued on imu"]
        );

        let lines = run(&mut session, "tick 8");
        assert!(lines.iter().any(|line| line == "[camera] calibrated at frame 6"));
        assert!(
            session
                .odometer()
                .sensors()
                .borrow()
                .camera
                .sensor()
                .borrow()
                .calibrated
        );

        assert_eq!(
            run(&mut session, "stop track"),
            ["OK stop track queued on odometer"]
        );
    }

    #[test]
    fn errors_are_reported_not_fatal() {
        let mut session = session();
        assert!(run(&mut session, "launch")[0].starts_with("ERR syntax"));
        assert_eq!(
            run(&mut session, "begin gimbal"),
            ["ERR unknown mode `gimbal`"]
        );
        assert!(run(&mut session, "resume")[0].starts_with("ERR resume rejected"));
        assert!(run(&mut session, "help tick")[0].starts_with("tick [n]"));
        assert_eq!(run(&mut session, "help fly")[0], "No help available for `fly`.");
    }

    #[test]
    fn slow_tick_requests_are_gated() {
        let mut session = session();
        let lines = run(&mut session, "tick 4 every 50ms");
        assert_eq!(
            &lines[lines.len() - 2..],
            [
                "OK ran 2/4 ticks uptime=100ms",
                "2 ticks skipped, interval below 100ms"
            ]
        );
    }

    #[test]
    fn exit_leaves_the_odometer_idle() {
        let mut session = session();
        run(&mut session, "tick 15");
        assert_eq!(run(&mut session, "exit"), ["OK exit queued on odometer"]);

        let lines = run(&mut session, "tick 10");
        assert!(lines.iter().any(|line| line == "[odometer] halted"));
        assert_eq!(lines.last().map(String::as_str), Some("odometer idle"));
    }
}
