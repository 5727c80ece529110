//! Run driver: owns the world, its observers and the output sink
//!
//! A run moves through `Ready → Running → Halted`. Every termination path
//! (max steps, interrupt, cancellation, numerical error) flushes the
//! observers exactly once before reporting how it ended.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{info, warn};

use crate::config::Config;
use crate::error::{LoadError, NumericalError};
use crate::observer::Observer;
use crate::platform::OutputSink;
use crate::sim::{Interrupt, Registry, Scene, StepFrame, World, interrupt::first_firing, tick};

/// Cooperative cancellation flag, checked once per step
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Why a run stopped
#[derive(Debug, Clone, PartialEq)]
pub enum Halt {
    MaxSteps,
    /// Description of the first interrupt that fired
    Interrupt(String),
    Cancelled,
    Error(NumericalError),
}

impl fmt::Display for Halt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Halt::MaxSteps => write!(f, "reached max_steps"),
            Halt::Interrupt(reason) => write!(f, "interrupted by {reason}"),
            Halt::Cancelled => write!(f, "cancelled"),
            Halt::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub halt: Halt,
    pub steps: u64,
    pub time: f64,
    /// First failure while handing observer output to the sink
    pub output_error: Option<String>,
}

/// A loaded scene ready to be stepped
pub struct Simulation {
    world: World,
    registry: Registry,
    interrupts: Vec<Interrupt>,
    observers: Vec<Observer>,
    max_steps: u64,
    sink: Box<dyn OutputSink>,
    cancel: CancelToken,
    frame: StepFrame,
    started: bool,
    halted: Option<Halt>,
    output_error: Option<String>,
}

impl fmt::Debug for Simulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Simulation")
            .field("step", &self.world.step)
            .field("time", &self.world.time)
            .field("max_steps", &self.max_steps)
            .field("observers", &self.observers.len())
            .field("halted", &self.halted)
            .finish_non_exhaustive()
    }
}

/// Parse `json` and build a simulation writing to `sink`
pub fn create_simulation(json: &str, sink: impl OutputSink + 'static) -> Result<Simulation, LoadError> {
    Simulation::from_config(&Config::from_json(json)?, Box::new(sink))
}

impl Simulation {
    pub fn from_config(config: &Config, sink: Box<dyn OutputSink>) -> Result<Self, LoadError> {
        let scene = Scene::load(config)?;
        let observers = config
            .observers
            .iter()
            .enumerate()
            .map(|(i, cfg)| {
                Observer::from_config(
                    cfg,
                    &scene.registry,
                    scene.record_objects,
                    config.simulation.verbose,
                    &format!("observers[{i}]"),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        let Scene {
            world,
            registry,
            interrupts,
            max_steps,
            ..
        } = scene;
        Ok(Self {
            world,
            registry,
            interrupts,
            observers,
            max_steps,
            sink,
            cancel: CancelToken::new(),
            frame: StepFrame::default(),
            started: false,
            halted: None,
            output_error: None,
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn observers(&self) -> &[Observer] {
        &self.observers
    }

    /// Set once the run has halted
    pub fn halted(&self) -> Option<&Halt> {
        self.halted.as_ref()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn set_max_steps(&mut self, max_steps: u64) {
        self.max_steps = max_steps;
    }

    /// Height over width of the first raster observer, 1.0 without one
    pub fn aspect_ratio(&self) -> f64 {
        self.observers
            .iter()
            .find_map(Observer::region)
            .map(|r| r.height() / r.width())
            .unwrap_or(1.0)
    }

    /// Set every raster to `width` pixels; only effective before the first step
    pub fn resize_rasters(&mut self, width: u32) {
        if self.started {
            warn!("ignoring raster resize after the run started");
            return;
        }
        for observer in &mut self.observers {
            observer.resize(width);
        }
    }

    /// Human-readable summary of the loaded scene
    pub fn describe(&self) -> Vec<String> {
        let p = &self.world.params;
        let mut lines = vec![format!(
            "simulation: dt {} eps {} max_steps {} {}{}{}",
            p.dt,
            p.eps,
            self.max_steps,
            if p.linear { "linear" } else { "parabolic" },
            if p.equal_time { " equal_time" } else { "" },
            if p.accuracy { " accuracy" } else { "" },
        )];
        lines.push(format!("objects: {}", self.world.shapes.len()));
        for (id, shape) in self.world.shapes.iter().enumerate() {
            let kind = if shape.is_dynamic() { "concentric" } else { shape.current().kind() };
            lines.push(format!(
                "  [{id}] {kind} '{}' damp {}{}",
                shape.label,
                shape.damp,
                if shape.absorb { " absorb" } else { "" }
            ));
        }
        lines.extend(
            self.registry
                .entries()
                .map(|e| format!("  name '{}' -> {} objects", e.name, e.shapes.len())),
        );
        lines.push(format!("particles: {}", self.world.particles.len()));
        lines.extend(self.world.forces.describe().into_iter().map(|f| format!("force: {f}")));
        lines.push(format!("neighborlist: {}", self.world.broadphase.describe()));
        lines.extend(self.interrupts.iter().map(|i| format!("interrupt: {i}")));
        lines.extend(self.observers.iter().map(|o| format!("observer: {}", o.describe())));
        lines
    }

    /// Send [`Self::describe`] to the status stream
    pub fn log_description(&mut self) {
        for line in self.describe() {
            self.sink.log(&line);
        }
    }

    /// Advance one step, returning the halt reason once the run has stopped
    pub fn step(&mut self) -> Option<&Halt> {
        if self.halted.is_some() {
            return self.halted.as_ref();
        }
        if !self.started {
            self.started = true;
            info!("run started: {} particles, max_steps {}", self.world.particles.len(), self.max_steps);
            for observer in &mut self.observers {
                observer.start(&self.world);
            }
        }
        if let Some(halt) = self.advance() {
            self.finish(halt);
        }
        self.halted.as_ref()
    }

    fn advance(&mut self) -> Option<Halt> {
        if self.cancel.is_cancelled() {
            return Some(Halt::Cancelled);
        }
        if self.world.step >= self.max_steps {
            return Some(Halt::MaxSteps);
        }
        if let Err(e) = tick(&mut self.world, &mut self.frame) {
            return Some(Halt::Error(e));
        }
        let fired = first_firing(&self.interrupts, &self.frame).map(|i| i.to_string());
        for observer in &mut self.observers {
            observer.observe(&self.world, &self.frame, self.sink.as_mut());
        }
        match fired {
            Some(reason) => Some(Halt::Interrupt(reason)),
            None if self.world.step >= self.max_steps => Some(Halt::MaxSteps),
            None => None,
        }
    }

    fn finish(&mut self, halt: Halt) {
        for observer in &mut self.observers {
            if let Err(e) = observer.finish(self.sink.as_mut()) {
                warn!("observer output failed: {e}");
                self.output_error.get_or_insert_with(|| e.to_string());
            }
        }
        match &halt {
            Halt::Error(e) => warn!("run halted at step {}: {e}", self.world.step),
            other => info!("run halted at step {}: {other}", self.world.step),
        }
        self.halted = Some(halt);
    }

    /// Step until halted
    pub fn run(&mut self) -> RunResult {
        while self.step().is_none() {}
        RunResult {
            halt: self.halted.clone().unwrap_or(Halt::Cancelled),
            steps: self.world.step,
            time: self.world.time,
            output_error: self.output_error.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::MemorySink;

    const FALLING: &str = r#"{
        "simulation": { "dt": 1e-3, "max_steps": 5000 },
        "objects": [ { "type": "segment", "p0": [-1.0, 0.0], "p1": [1.0, 0.0], "name": "floor" } ],
        "particles": [ { "type": "single", "pos": [0.0, 1.0], "vel": [0.0, 0.0] } ],
        "forces": [ { "type": "gravity", "g": -1.0 } ],
        "interrupts": [ { "type": "collision", "object": { "type": "ref", "name": "floor" } } ],
        "observers": [ { "type": "pgm", "filename": "fall", "resolution": [16, 16],
            "box": { "type": "box", "ll": [-1.0, -1.0], "uu": [1.0, 1.0] } } ]
    }"#;

    #[test]
    fn test_interrupt_halts_before_max_steps() {
        let sink = MemorySink::new();
        let mut sim = create_simulation(FALLING, sink.clone()).unwrap();
        let result = sim.run();
        assert_eq!(result.halt, Halt::Interrupt("collision with 'floor'".into()));
        assert!(result.steps < 5000);
        // free fall from y = 1 takes sqrt(2) time units
        assert!((result.steps as f64 * 1e-3 - 2f64.sqrt()).abs() < 2e-3);
        assert_eq!(sink.images(), vec!["fall".to_string()]);
    }

    #[test]
    fn test_max_steps_zero_halts_immediately() {
        let sink = MemorySink::new();
        let mut sim = create_simulation(FALLING, sink.clone()).unwrap();
        sim.set_max_steps(0);
        let result = sim.run();
        assert_eq!(result.halt, Halt::MaxSteps);
        assert_eq!(result.steps, 0);
        assert_eq!(sink.images().len(), 1);
    }

    #[test]
    fn test_cancel_flushes_once() {
        let sink = MemorySink::new();
        let mut sim = create_simulation(FALLING, sink.clone()).unwrap();
        assert!(sim.step().is_none());
        sim.cancel_token().cancel();
        assert_eq!(sim.step(), Some(&Halt::Cancelled));
        assert_eq!(sim.step(), Some(&Halt::Cancelled));
        assert_eq!(sim.world().step, 1);
        assert_eq!(sink.images().len(), 1);
    }

    #[test]
    fn test_aspect_ratio() {
        let sim = create_simulation(FALLING, MemorySink::new()).unwrap();
        assert_eq!(sim.aspect_ratio(), 1.0);
        let json = r#"{ "observers": [ { "type": "step", "interval": 1 },
            { "type": "pgm", "box": { "type": "box", "ll": [0.0, 0.0], "uu": [2.0, 1.0] } } ] }"#;
        let sim = create_simulation(json, MemorySink::new()).unwrap();
        assert_eq!(sim.aspect_ratio(), 0.5);
        let sim = create_simulation("{}", MemorySink::new()).unwrap();
        assert_eq!(sim.aspect_ratio(), 1.0);
    }

    #[test]
    fn test_describe_lists_scene() {
        let sink = MemorySink::new();
        let mut sim = create_simulation(FALLING, sink.clone()).unwrap();
        sim.log_description();
        let lines = sink.logged();
        assert!(lines[0].starts_with("simulation: dt 0.001"));
        assert!(lines.iter().any(|l| l == "interrupt: collision with 'floor'"));
        assert!(lines.iter().any(|l| l.starts_with("force: gravity")));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn test_runs_on_a_worker_thread() {
        fn assert_send<T: Send>() {}
        assert_send::<Simulation>();

        let sink = MemorySink::new();
        let mut sim = create_simulation(FALLING, sink.clone()).unwrap();
        let token = sim.cancel_token();
        let worker = std::thread::spawn(move || {
            let first = sim.step().cloned();
            (first, sim.run())
        });
        let (first, result) = worker.join().unwrap();
        assert_eq!(first, None);
        assert!(matches!(result.halt, Halt::Interrupt(_)));
        // cancelling after the run halted changes nothing
        token.cancel();
        assert_eq!(sink.images(), vec!["fall".to_string()]);
    }

    #[test]
    fn test_load_errors_surface() {
        assert!(matches!(
            create_simulation("{ not json", MemorySink::new()),
            Err(LoadError::Json(_))
        ));
    }
}
