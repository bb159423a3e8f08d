//! The composite odometer: a top-level scheduler whose `track` mode drives
//! the camera and IMU schedulers.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mode_core::console::{self, Action, Command, CommandError, ModeDirectory};
use mode_core::{
    Key, ModeContext, ModeControl, ModeHandle, ModeHandler, ModeId, Outcome, Phase,
    RegistryError, ReservedMode, Scheduler, SchedulerConfig, SystemHooks,
};

use crate::render::progress_bar;
use crate::sensors::{self, Camera, CameraModes, Imu, Sensor, Shared, request};
use crate::transcript::{SharedTranscript, prefixed_sink};

/// How long `start` warms the sensors up before tracking begins.
pub const START_DURATION: Duration = Duration::from_secs(1);

/// Minimum time `exit` spends winding the sensors down.
pub const EXIT_DURATION: Duration = Duration::from_millis(500);

/// Child devices owned by the odometer.
pub struct Sensors {
    pub camera: Camera,
    pub camera_modes: CameraModes,
    pub imu: Imu,
    pub imu_reader: ModeHandle,
}

impl Sensors {
    fn tick(&mut self, now: Duration) {
        self.camera.tick(now);
        self.imu.tick(now);
    }

    /// Applies the same request to every child scheduler.
    fn broadcast(&mut self, apply: impl Fn(&mut dyn ModeControl) -> bool) {
        request(&mut self.camera, &apply);
        request(&mut self.imu, &apply);
    }

    fn is_ready(&self) -> bool {
        self.camera.sensor().borrow().is_connected() && self.imu.sensor().borrow().is_connected()
    }

    fn is_idle(&self) -> bool {
        self.camera.scheduler().is_complete() && self.imu.scheduler().is_complete()
    }
}

pub struct OdometerHooks {
    sensors: Shared<Sensors>,
    track: Option<ModeId>,
    exiting: bool,
}

impl SystemHooks for OdometerHooks {
    fn is_ready(&self) -> bool {
        self.sensors.borrow().is_ready()
    }

    fn on_start(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.sensors.borrow_mut().tick(ctx.uptime());
        let elapsed = ctx.own_active_time();
        ctx.log(format_args!("{}", progress_bar("start", elapsed, START_DURATION)));
        Outcome::continue_if(elapsed < START_DURATION)
    }

    fn on_pause(&mut self, phase: Phase, ctx: &mut ModeContext<'_>) -> Outcome {
        let mut sensors = self.sensors.borrow_mut();
        match phase {
            Phase::Begin => sensors.broadcast(|child| child.pause()),
            Phase::End => sensors.broadcast(|child| child.resume()),
            Phase::Running | Phase::Discard => {}
        }
        sensors.tick(ctx.uptime());
        Outcome::Continue
    }

    fn on_exit(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        let mut sensors = self.sensors.borrow_mut();
        if !self.exiting {
            self.exiting = true;
            sensors.broadcast(|child| child.exit());
        }
        sensors.tick(ctx.uptime());
        let elapsed = ctx.own_active_time();
        ctx.log(format_args!("{}", progress_bar("exit", elapsed, EXIT_DURATION)));
        Outcome::continue_if(elapsed < EXIT_DURATION || !sensors.is_idle())
    }

    fn on_reset(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        let mut sensors = self.sensors.borrow_mut();
        sensors.broadcast(|child| child.reset());
        sensors.tick(ctx.uptime());
        Outcome::Finished
    }

    fn on_reboot(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        let mut sensors = self.sensors.borrow_mut();
        sensors.broadcast(|child| child.reboot());
        sensors.tick(ctx.uptime());
        Outcome::Finished
    }

    fn on_finished(&mut self, mode: ReservedMode, ctx: &mut ModeContext<'_>) {
        match mode {
            ReservedMode::Start => {
                let Some(track) = self.track else {
                    return;
                };
                if self.is_ready() && ctx.begin_mode(track) {
                    ctx.log(format_args!("sensors ready, tracking"));
                }
            }
            ReservedMode::Exit => {
                self.exiting = false;
                ctx.log(format_args!("halted"));
            }
            ReservedMode::Pause | ReservedMode::Reset | ReservedMode::Reboot => {}
        }
    }

    fn on_key(&mut self, key: Key, control: &mut dyn ModeControl) -> bool {
        let mut sensors = self.sensors.borrow_mut();
        let Sensors {
            camera,
            camera_modes,
            ..
        } = &mut *sensors;
        match key {
            Key::Char('t') => {
                let Some(track) = self.track else {
                    return false;
                };
                if control.mode_active(track) {
                    control.stop_mode(track);
                } else {
                    control.begin_mode(track);
                }
            }
            Key::Char('g') => {
                camera_modes.grabber.toggle(camera.scheduler_mut());
            }
            Key::Char('r') => {
                camera_modes.recorder.toggle(camera.scheduler_mut());
            }
            Key::Char('c') => {
                camera_modes.calibrator.start(camera.scheduler_mut());
            }
            _ => return false,
        }
        true
    }
}

/// Records with the camera and integrates the IMU for as long as it runs.
struct Track {
    sensors: Shared<Sensors>,
    reported_secs: u64,
}

impl ModeHandler for Track {
    fn on_begin(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        self.reported_secs = 0;
        let mut sensors = self.sensors.borrow_mut();
        let Sensors {
            camera,
            camera_modes,
            imu,
            imu_reader,
        } = &mut *sensors;
        camera_modes.grabber.start(camera.scheduler_mut());
        camera_modes.recorder.start(camera.scheduler_mut());
        imu_reader.start(imu.scheduler_mut());
        Outcome::Continue
    }

    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        let mut sensors = self.sensors.borrow_mut();
        sensors.tick(ctx.uptime());

        let secs = ctx.own_active_time().as_secs();
        if secs > self.reported_secs {
            self.reported_secs = secs;
            let frames = sensors.camera.sensor().borrow().recorded;
            let distance = sensors.imu.sensor().borrow().distance;
            ctx.log(format_args!("{frames} frames recorded, {distance:.2} m travelled"));
        }
        Outcome::Continue
    }

    fn on_end(&mut self, ctx: &mut ModeContext<'_>) {
        let mut sensors = self.sensors.borrow_mut();
        sensors.broadcast(|child| child.stop_all());
        sensors.tick(ctx.uptime());
        ctx.log(format_args!("tracking stopped"));
    }
}

pub type OdometerScheduler = Scheduler<Duration, OdometerHooks>;

pub struct Odometer {
    scheduler: OdometerScheduler,
    directory: ModeDirectory,
    sensors: Shared<Sensors>,
}

impl Odometer {
    /// Builds the device tree and requests `start`.
    pub fn new(config: SchedulerConfig, transcript: &SharedTranscript) -> Result<Self, RegistryError> {
        let (camera, camera_modes) = sensors::camera(transcript)?;
        let (imu, imu_reader) = sensors::imu(transcript)?;
        let sensors = Rc::new(RefCell::new(Sensors {
            camera,
            camera_modes,
            imu,
            imu_reader,
        }));

        let hooks = OdometerHooks {
            sensors: Rc::clone(&sensors),
            track: None,
            exiting: false,
        };
        let mut scheduler = Scheduler::with_config(config, hooks);
        scheduler.set_log_sink(prefixed_sink("odometer", transcript));
        let track = scheduler.register_mode(Track {
            sensors: Rc::clone(&sensors),
            reported_secs: 0,
        })?;
        scheduler.hooks_mut().track = Some(track);

        let mut directory = ModeDirectory::new();
        directory.insert("track", track)?;
        scheduler.start();

        Ok(Self {
            scheduler,
            directory,
            sensors,
        })
    }

    pub fn tick(&mut self, now: Duration) -> bool {
        self.scheduler.tick(now)
    }

    /// Applies a console command to the top-level scheduler.
    pub fn execute<'a>(&mut self, command: Command<'a>) -> Result<Action<'a>, CommandError<'a>> {
        console::execute(command, &mut self.scheduler, &self.directory)
    }

    /// Hands every scheduler's buffered lines to the transcript.
    pub fn flush_logs(&mut self) {
        self.scheduler.flush_log();
        let mut sensors = self.sensors.borrow_mut();
        sensors.camera.flush_log();
        sensors.imu.flush_log();
    }

    pub fn scheduler(&self) -> &OdometerScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut OdometerScheduler {
        &mut self.scheduler
    }

    pub fn directory(&self) -> &ModeDirectory {
        &self.directory
    }

    pub fn sensors(&self) -> &Shared<Sensors> {
        &self.sensors
    }

    /// Returns `true` once every mode, child schedulers included, has ended.
    pub fn is_complete(&self) -> bool {
        self.scheduler.is_complete() && self.sensors.borrow().is_idle()
    }
}
