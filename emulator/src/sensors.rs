//! Simulated camera and IMU, and the child schedulers that drive them.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use mode_core::console::{self, Action, Command, CommandError, ModeDirectory};
use mode_core::{
    Behavior, DeviceMode, ModeContext, ModeControl, ModeHandle, Outcome, RegistryError,
    Scheduler, SchedulerConfig, SystemHooks,
};

use crate::transcript::{SharedTranscript, prefixed_sink};

pub type Shared<T> = Rc<RefCell<T>>;

/// Frames the calibrator samples before it reports a calibration.
pub const CALIBRATION_FRAMES: u32 = 5;

/// Simulated forward speed integrated by the IMU reader, in metres per second.
pub const SIM_SPEED: f64 = 0.5;

/// Hardware state shared between a device's hooks and its behaviors.
pub trait Sensor {
    fn is_connected(&self) -> bool;

    /// Clears accumulated measurements.
    fn reset(&mut self);

    /// Power-cycles the sensor.
    fn reconnect(&mut self);
}

#[derive(Debug)]
pub struct SimCamera {
    pub connected: bool,
    pub frame: u64,
    pub latest: Option<u64>,
    pub recorded: u64,
    pub calibrated: bool,
    pub reboots: u32,
}

impl SimCamera {
    pub fn new() -> Self {
        Self {
            connected: true,
            frame: 0,
            latest: None,
            recorded: 0,
            calibrated: false,
            reboots: 0,
        }
    }

    fn grab(&mut self) -> u64 {
        self.frame += 1;
        self.latest = Some(self.frame);
        self.frame
    }
}

impl Sensor for SimCamera {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset(&mut self) {
        self.frame = 0;
        self.latest = None;
        self.recorded = 0;
        self.calibrated = false;
    }

    fn reconnect(&mut self) {
        self.connected = true;
        self.reboots += 1;
    }
}

#[derive(Debug)]
pub struct SimImu {
    pub connected: bool,
    pub samples: u64,
    pub distance: f64,
    pub reboots: u32,
}

impl SimImu {
    pub fn new() -> Self {
        Self {
            connected: true,
            samples: 0,
            distance: 0.0,
            reboots: 0,
        }
    }

    fn integrate(&mut self, delta: Duration) {
        self.samples += 1;
        self.distance += SIM_SPEED * delta.as_secs_f64();
    }
}

impl Sensor for SimImu {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn reset(&mut self) {
        self.samples = 0;
        self.distance = 0.0;
    }

    fn reconnect(&mut self) {
        self.connected = true;
        self.reboots += 1;
    }
}

/// Reserved-mode hooks of a sensor's own scheduler.
pub struct SensorHooks<S> {
    sensor: Shared<S>,
}

impl<S: Sensor> SystemHooks for SensorHooks<S> {
    fn is_ready(&self) -> bool {
        self.sensor.borrow().is_connected()
    }

    fn on_reset(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.sensor.borrow_mut().reset();
        ctx.log(format_args!("measurements cleared"));
        Outcome::Finished
    }

    fn on_reboot(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        let mut sensor = self.sensor.borrow_mut();
        sensor.reset();
        sensor.reconnect();
        ctx.log(format_args!("power cycled"));
        Outcome::Finished
    }
}

/// A sensor together with the scheduler running its behaviors.
pub struct Device<S> {
    name: &'static str,
    sensor: Shared<S>,
    scheduler: Scheduler<Duration, SensorHooks<S>>,
    directory: ModeDirectory,
    last_tick: Option<Duration>,
}

impl<S: Sensor + 'static> Device<S> {
    pub fn new(name: &'static str, sensor: S, transcript: &SharedTranscript) -> Self {
        let sensor = Rc::new(RefCell::new(sensor));
        let hooks = SensorHooks {
            sensor: Rc::clone(&sensor),
        };
        let mut scheduler = Scheduler::with_config(SchedulerConfig::new(Duration::ZERO), hooks);
        scheduler.set_log_sink(prefixed_sink(name, transcript));
        Self {
            name,
            sensor,
            scheduler,
            directory: ModeDirectory::new(),
            last_tick: None,
        }
    }

    /// Binds `behavior` and names it for the console.
    pub fn bind<B>(&mut self, name: &'static str, behavior: B) -> Result<ModeHandle, RegistryError>
    where
        B: Behavior + 'static,
    {
        let handle = DeviceMode::bind(&mut self.scheduler, behavior)?;
        self.directory.insert(name, handle.id())?;
        Ok(handle)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn sensor(&self) -> &Shared<S> {
        &self.sensor
    }

    pub fn scheduler(&self) -> &Scheduler<Duration, SensorHooks<S>> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler<Duration, SensorHooks<S>> {
        &mut self.scheduler
    }

    pub fn directory(&self) -> &ModeDirectory {
        &self.directory
    }

    /// Applies a console command to this device.
    pub fn execute<'a>(&mut self, command: Command<'a>) -> Result<Action<'a>, CommandError<'a>> {
        console::execute(command, &mut self.scheduler, &self.directory)
    }

    pub fn flush_log(&mut self) {
        self.scheduler.flush_log();
    }

    /// Ticks the child scheduler at most once per parent timestamp.
    pub fn tick(&mut self, now: Duration) -> bool {
        if self.last_tick == Some(now) {
            return false;
        }
        self.last_tick = Some(now);
        self.scheduler.tick(now)
    }
}

pub type Camera = Device<SimCamera>;
pub type Imu = Device<SimImu>;

/// Console handles of the camera's behaviors.
#[derive(Clone, Debug)]
pub struct CameraModes {
    pub grabber: ModeHandle,
    pub recorder: ModeHandle,
    pub calibrator: ModeHandle,
}

pub fn camera(transcript: &SharedTranscript) -> Result<(Camera, CameraModes), RegistryError> {
    let mut device = Device::new("camera", SimCamera::new(), transcript);
    let sensor = Rc::clone(device.sensor());
    let grabber = device.bind(
        "frame-grabber",
        FrameGrabber {
            camera: Rc::clone(&sensor),
        },
    )?;
    let recorder = device.bind(
        "recorder",
        Recorder {
            camera: Rc::clone(&sensor),
        },
    )?;
    let calibrator = device.bind(
        "calibrator",
        Calibrator {
            camera: sensor,
            samples: 0,
            last_frame: 0,
        },
    )?;
    Ok((
        device,
        CameraModes {
            grabber,
            recorder,
            calibrator,
        },
    ))
}

pub fn imu(transcript: &SharedTranscript) -> Result<(Imu, ModeHandle), RegistryError> {
    let mut device = Device::new("imu", SimImu::new(), transcript);
    let sensor = Rc::clone(device.sensor());
    let reader = device.bind("imu-reader", ImuReader { imu: sensor })?;
    Ok((device, reader))
}

struct FrameGrabber {
    camera: Shared<SimCamera>,
}

impl Behavior for FrameGrabber {
    fn is_ready(&self) -> bool {
        self.camera.borrow().is_connected()
    }

    fn on_run(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        self.camera.borrow_mut().grab();
        Outcome::Continue
    }
}

struct Recorder {
    camera: Shared<SimCamera>,
}

impl Behavior for Recorder {
    fn on_run(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        let mut camera = self.camera.borrow_mut();
        if camera.latest.take().is_some() {
            camera.recorded += 1;
        }
        Outcome::Continue
    }

    fn on_end(&mut self, ctx: &mut ModeContext<'_>) {
        let recorded = self.camera.borrow().recorded;
        ctx.log(format_args!("recorder stopped after {recorded} frames"));
    }
}

struct Calibrator {
    camera: Shared<SimCamera>,
    samples: u32,
    last_frame: u64,
}

impl Behavior for Calibrator {
    fn is_ready(&self) -> bool {
        self.camera.borrow().is_connected()
    }

    fn on_begin(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        if !self.is_ready() {
            return Outcome::Finished;
        }
        self.samples = 0;
        self.camera.borrow_mut().calibrated = false;
        ctx.log(format_args!("calibrating over {CALIBRATION_FRAMES} frames"));
        Outcome::Continue
    }

    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        let frame = self.camera.borrow().frame;
        if frame != self.last_frame {
            self.last_frame = frame;
            self.samples += 1;
        }
        if self.samples < CALIBRATION_FRAMES {
            return Outcome::Continue;
        }
        self.camera.borrow_mut().calibrated = true;
        ctx.log(format_args!("calibrated at frame {frame}"));
        Outcome::Finished
    }
}

struct ImuReader {
    imu: Shared<SimImu>,
}

impl Behavior for ImuReader {
    fn is_ready(&self) -> bool {
        self.imu.borrow().is_connected()
    }

    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.imu.borrow_mut().integrate(ctx.delta());
        Outcome::Continue
    }

    fn on_pause(&mut self, paused: bool, ctx: &mut ModeContext<'_>) {
        if paused {
            let distance = self.imu.borrow().distance;
            ctx.log(format_args!("holding at {distance:.2} m"));
        }
    }
}

/// Applies a control request to a child scheduler, logging refusals.
pub fn request<S: Sensor + 'static>(
    device: &mut Device<S>,
    apply: impl FnOnce(&mut dyn ModeControl) -> bool,
) {
    let name = device.name();
    let control: &mut dyn ModeControl = device.scheduler_mut();
    if !apply(control) {
        log::debug!("{name}: request ignored");
    }
}
