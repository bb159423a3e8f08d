use std::cell::{Cell, RefCell};
use std::ops::Sub;
use std::rc::Rc;
use std::time::Duration;

use mode_core::{
    Behavior, DeviceMode, ModeContext, ModeControl, ModeHandle, ModeHandler, Outcome, Scheduler,
    SchedulerConfig,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
struct MockInstant(u64);

impl Sub for MockInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(rhs.0))
    }
}

const TICK: u64 = 100;

/// Counts frames while recording.
struct Recorder {
    frames: Rc<Cell<u32>>,
}

impl Behavior for Recorder {
    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.frames.set(self.frames.get() + 1);
        ctx.log(format_args!("frame {} at {:?}", self.frames.get(), ctx.uptime()));
        Outcome::Continue
    }
}

/// A device with its own scheduler, driven by the parent's clock.
struct Camera {
    scheduler: Scheduler<Duration>,
    recorder: ModeHandle,
}

impl Camera {
    fn new(frames: &Rc<Cell<u32>>) -> Self {
        let mut scheduler = Scheduler::with_config(
            SchedulerConfig::new(Duration::ZERO),
            mode_core::NoopSystemHooks,
        );
        let recorder = DeviceMode::bind(
            &mut scheduler,
            Recorder {
                frames: Rc::clone(frames),
            },
        )
        .expect("recorder binds");
        Self {
            scheduler,
            recorder,
        }
    }
}

/// Parent mode that records for as long as it runs.
struct Track {
    camera: Rc<RefCell<Camera>>,
}

impl ModeHandler for Track {
    fn on_begin(&mut self, _ctx: &mut ModeContext<'_>) -> Outcome {
        let mut camera = self.camera.borrow_mut();
        let Camera {
            scheduler,
            recorder,
        } = &mut *camera;
        Outcome::continue_if(recorder.start(scheduler))
    }

    fn on_run(&mut self, ctx: &mut ModeContext<'_>) -> Outcome {
        self.camera.borrow_mut().scheduler.tick(ctx.uptime());
        Outcome::Continue
    }

    fn on_end(&mut self, ctx: &mut ModeContext<'_>) {
        let mut camera = self.camera.borrow_mut();
        let Camera {
            scheduler,
            recorder,
        } = &mut *camera;
        recorder.stop(scheduler);
        scheduler.tick(ctx.uptime());
    }
}

fn parent() -> Scheduler<MockInstant> {
    Scheduler::with_config(
        SchedulerConfig::new(Duration::from_millis(TICK)),
        mode_core::NoopSystemHooks,
    )
}

#[test]
fn parent_mode_drives_a_child_scheduler() {
    let frames = Rc::new(Cell::new(0));
    let camera = Rc::new(RefCell::new(Camera::new(&frames)));
    let mut parent = parent();
    let track = parent
        .register_mode(Track {
            camera: Rc::clone(&camera),
        })
        .expect("track registers");

    parent.begin_mode(track);
    for step in 0..5 {
        assert!(parent.tick(MockInstant(step * TICK)));
    }
    {
        let camera = camera.borrow();
        assert!(camera.recorder.is_active(&camera.scheduler));
        // Child ticks at 100ms (begin), then 200, 300 and 400ms.
        assert_eq!(frames.get(), 3);
        assert_eq!(camera.scheduler.uptime(), Duration::from_millis(3 * TICK));
    }

    parent.stop_mode(track);
    parent.tick(MockInstant(5 * TICK));
    assert!(!parent.mode_active(track));

    let camera = camera.borrow();
    assert!(!camera.recorder.is_active(&camera.scheduler));
    assert!(camera.scheduler.is_complete());
    assert_eq!(frames.get(), 3);
    assert_eq!(camera.recorder.active_time(), Duration::from_millis(4 * TICK));
    assert_eq!(
        camera.scheduler.active_time(camera.recorder.id()),
        Duration::from_millis(3 * TICK)
    );
}

#[test]
fn child_logs_surface_through_its_own_sink() {
    let frames = Rc::new(Cell::new(0));
    let camera = Rc::new(RefCell::new(Camera::new(&frames)));
    let lines = Rc::new(RefCell::new(Vec::<String>::new()));
    let sink_lines = Rc::clone(&lines);
    camera
        .borrow_mut()
        .scheduler
        .set_log_sink(Box::new(move |line: &str| {
            sink_lines.borrow_mut().push(format!("camera: {line}"));
        }));

    let mut parent = parent();
    let track = parent
        .register_mode(Track {
            camera: Rc::clone(&camera),
        })
        .expect("track registers");
    parent.begin_mode(track);
    for step in 0..4 {
        parent.tick(MockInstant(step * TICK));
    }

    assert_eq!(*lines.borrow(), ["camera: frame 1 at 100ms"]);
}

#[test]
fn handles_outlive_restarts() {
    let frames = Rc::new(Cell::new(0));
    let mut camera = Camera::new(&frames);
    let id = camera.recorder.id();

    for round in 0..2_u64 {
        let base = round * 10 * TICK;
        assert!(camera.recorder.start(&mut camera.scheduler));
        camera.scheduler.tick(Duration::from_millis(base));
        camera.scheduler.tick(Duration::from_millis(base + TICK));
        assert!(camera.recorder.stop(&mut camera.scheduler));
        camera.scheduler.tick(Duration::from_millis(base + 2 * TICK));
        assert!(!camera.scheduler.mode_active(id));
    }

    assert_eq!(frames.get(), 2);
    assert_eq!(camera.recorder.active_time(), Duration::from_millis(2 * TICK));
    assert_eq!(camera.scheduler.active_time(id), Duration::from_millis(TICK));
}
