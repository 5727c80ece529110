//! Observers watch a run without touching it
//!
//! - `pgm`: accumulates the chords particles travel into a raster and hands
//!   a graymap to the sink when the run ends
//! - `step`: periodic status lines on the log stream

pub mod pgm;
pub mod raster;

pub use pgm::{Pgm, normalize};
pub use raster::Raster;

use log::{info, warn};

use crate::config::{Norm, ObserverConfig, PgmFormat};
use crate::consts::{DEFAULT_RASTER_WIDTH, MAX_RASTER_PIXELS};
use crate::error::{Error, LoadError};
use crate::platform::OutputSink;
use crate::sim::{Rect, Registry, StepFrame, World};

/// Outline sampling bounds for curved shapes
const MIN_OUTLINE_SAMPLES: usize = 16;
const MAX_OUTLINE_SAMPLES: usize = 16384;

/// Raster observer writing a portable graymap
#[derive(Debug, Clone)]
pub struct PgmObserver {
    pub filename: String,
    raster: Raster,
    norm: Norm,
    format: PgmFormat,
    record_objects: bool,
}

impl PgmObserver {
    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    fn draw_outlines<'a>(&mut self, shapes: impl Iterator<Item = &'a crate::sim::Shape>) {
        let ppu = self.raster.pixels_per_unit();
        for shape in shapes {
            let primitive = shape.current();
            let bounds = primitive.bounds();
            let extent = bounds.width().max(bounds.height()) * ppu * 2.0;
            let samples = if extent.is_finite() {
                (extent.ceil() as usize).clamp(MIN_OUTLINE_SAMPLES, MAX_OUTLINE_SAMPLES)
            } else {
                MIN_OUTLINE_SAMPLES
            };
            for (a, b) in primitive.outline(samples) {
                self.raster.line(a, b);
            }
        }
    }

    fn start(&mut self, world: &World) {
        if self.record_objects {
            self.draw_outlines(world.shapes.iter());
        }
    }

    fn observe(&mut self, world: &World, frame: &StepFrame) {
        for &(a, b) in &frame.paths {
            self.raster.line(a, b);
        }
        if self.record_objects {
            self.draw_outlines(world.shapes.iter().filter(|s| s.is_dynamic()));
        }
    }

    fn finish(&self, sink: &mut dyn OutputSink) -> Result<(), Error> {
        let image = Pgm::from_raster(&self.raster, self.norm, self.format);
        sink.raster(&self.filename, &image)
    }
}

/// Periodic status lines
#[derive(Debug, Clone)]
pub struct StepObserver {
    pub interval: u64,
    verbose: bool,
}

impl StepObserver {
    fn observe(&self, world: &World, frame: &StepFrame, sink: &mut dyn OutputSink) {
        if frame.step % self.interval != 0 {
            return;
        }
        let line = format!(
            "step {} time {:.6} alive {} bounces {}",
            frame.step,
            frame.time,
            world.alive_count(),
            world.total_bounces()
        );
        info!("{line}");
        sink.log(&line);
        if self.verbose {
            for p in &world.particles {
                sink.log(&format!(
                    "  particle {} pos ({:.6}, {:.6}) vel ({:.6}, {:.6}) alive {} bounces {}",
                    p.id, p.pos.x, p.pos.y, p.vel.x, p.vel.y, p.alive, p.bounces
                ));
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum Observer {
    Pgm(PgmObserver),
    Step(StepObserver),
}

impl Observer {
    pub fn from_config(
        cfg: &ObserverConfig,
        registry: &Registry,
        record_objects: bool,
        verbose: bool,
        context: &str,
    ) -> Result<Self, LoadError> {
        match cfg {
            ObserverConfig::Pgm {
                filename,
                blend,
                norm,
                region,
                resolution,
                format,
            } => {
                let region = registry.region(region, context)?;
                if !(region.width() > 0.0 && region.height() > 0.0) {
                    return Err(LoadError::out_of_range("pgm.box", "must have positive area"));
                }
                let (width, height, field) = match *resolution {
                    Some([w, h]) if w > 0 && h > 0 => (w, h, "pgm.resolution"),
                    Some(_) => {
                        return Err(LoadError::out_of_range("pgm.resolution", "must be positive"));
                    }
                    None => (
                        DEFAULT_RASTER_WIDTH,
                        height_for(&region, DEFAULT_RASTER_WIDTH),
                        "pgm.box",
                    ),
                };
                if !fits(width, height) {
                    return Err(LoadError::out_of_range(
                        field,
                        format!("{width}x{height} raster exceeds {MAX_RASTER_PIXELS} pixels"),
                    ));
                }
                Ok(Observer::Pgm(PgmObserver {
                    filename: filename.clone(),
                    raster: Raster::new(region, width, height, *blend),
                    norm: *norm,
                    format: *format,
                    record_objects,
                }))
            }
            ObserverConfig::Step { interval } => {
                if *interval <= 0 {
                    return Err(LoadError::out_of_range("step.interval", "must be positive"));
                }
                Ok(Observer::Step(StepObserver {
                    interval: *interval as u64,
                    verbose,
                }))
            }
        }
    }

    /// Called once before the first step
    pub fn start(&mut self, world: &World) {
        if let Observer::Pgm(o) = self {
            o.start(world);
        }
    }

    /// Called after every completed step
    pub fn observe(&mut self, world: &World, frame: &StepFrame, sink: &mut dyn OutputSink) {
        match self {
            Observer::Pgm(o) => o.observe(world, frame),
            Observer::Step(o) => o.observe(world, frame, sink),
        }
    }

    /// Called exactly once when the run halts
    pub fn finish(&mut self, sink: &mut dyn OutputSink) -> Result<(), Error> {
        match self {
            Observer::Pgm(o) => o.finish(sink),
            Observer::Step(_) => Ok(()),
        }
    }

    /// Area covered by a raster observer
    pub fn region(&self) -> Option<Rect> {
        match self {
            Observer::Pgm(o) => Some(o.raster.region()),
            Observer::Step(_) => None,
        }
    }

    /// Change the raster resolution, keeping the aspect ratio of the box
    pub fn resize(&mut self, width: u32) {
        if let Observer::Pgm(o) = self {
            let width = width.max(1);
            let height = height_for(&o.raster.region(), width);
            if !fits(width, height) {
                warn!("ignoring resize of '{}' to {width}x{height} pixels", o.filename);
                return;
            }
            o.raster.resize(width, height);
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Observer::Pgm(o) => {
                let r = o.raster.region();
                format!(
                    "pgm '{}' {}x{} over ({}, {})-({}, {}) norm {:?} format {:?}",
                    o.filename,
                    o.raster.width(),
                    o.raster.height(),
                    r.ll.x,
                    r.ll.y,
                    r.uu.x,
                    r.uu.y,
                    o.norm,
                    o.format
                )
            }
            Observer::Step(o) => format!("step every {} steps", o.interval),
        }
    }
}

fn fits(width: u32, height: u32) -> bool {
    u64::from(width) * u64::from(height) <= MAX_RASTER_PIXELS
}

/// Raster height matching the aspect ratio of `region` at `width` pixels
pub fn height_for(region: &Rect, width: u32) -> u32 {
    let height = (f64::from(width) * region.height() / region.width()).round();
    if height.is_finite() && height >= 1.0 {
        height.min(f64::from(u32::MAX)) as u32
    } else {
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::platform::MemorySink;
    use crate::sim::Scene;

    fn scene(json: &str) -> Scene {
        Scene::load(&Config::from_json(json).unwrap()).unwrap()
    }

    fn observers(json: &str) -> (Scene, Vec<Observer>) {
        let config = Config::from_json(json).unwrap();
        let scene = Scene::load(&config).unwrap();
        let observers = config
            .observers
            .iter()
            .map(|o| Observer::from_config(o, &scene.registry, scene.record_objects, false, "observers").unwrap())
            .collect();
        (scene, observers)
    }

    #[test]
    fn test_default_resolution_follows_aspect_ratio() {
        let (_, obs) = observers(
            r#"{ "observers": [ { "type": "pgm",
                "box": { "type": "box", "ll": [0.0, 0.0], "uu": [2.0, 1.0] } } ] }"#,
        );
        let Observer::Pgm(pgm) = &obs[0] else {
            panic!("expected pgm")
        };
        assert_eq!(pgm.raster().width(), 512);
        assert_eq!(pgm.raster().height(), 256);
        assert_eq!(pgm.filename, "canvas");
    }

    #[test]
    fn test_invalid_observers_are_rejected() {
        let s = scene("{}");
        let flat: ObserverConfig = serde_json::from_str(
            r#"{ "type": "pgm", "box": { "type": "box", "ll": [0.0, 0.0], "uu": [1.0, 0.0] } }"#,
        )
        .unwrap();
        assert!(Observer::from_config(&flat, &s.registry, false, false, "o").is_err());
        let never: ObserverConfig = serde_json::from_str(r#"{ "type": "step", "interval": 0 }"#).unwrap();
        assert!(matches!(
            Observer::from_config(&never, &s.registry, false, false, "o"),
            Err(LoadError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_step_observer_interval() {
        let (scene, mut obs) = observers(
            r#"{ "particles": [ { "type": "single", "pos": [0.0, 0.0], "vel": [1.0, 0.0] } ],
                 "observers": [ { "type": "step", "interval": 2 } ] }"#,
        );
        let sink = MemorySink::new();
        let mut out = sink.clone();
        for step in 1..=4 {
            let frame = StepFrame {
                step,
                ..StepFrame::default()
            };
            obs[0].observe(&scene.world, &frame, &mut out);
        }
        let lines = sink.logged();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("step 2 time"));
        assert!(lines[1].ends_with("alive 1 bounces 0"));
    }

    #[test]
    fn test_record_objects_draws_outlines_at_start() {
        let (scene, mut obs) = observers(
            r#"{ "simulation": { "record_objects": true },
                 "objects": [ { "type": "circle", "pos": [0.5, 0.5], "rad": 0.25 } ],
                 "observers": [ { "type": "pgm", "resolution": [32, 32],
                    "box": { "type": "box", "ll": [0.0, 0.0], "uu": [1.0, 1.0] } } ] }"#,
        );
        obs[0].start(&scene.world);
        let Observer::Pgm(pgm) = &obs[0] else {
            panic!("expected pgm")
        };
        assert!(pgm.raster().data().iter().sum::<f64>() > 0.0);

        let sink = MemorySink::new();
        obs[0].finish(&mut sink.clone()).unwrap();
        let image = sink.image("canvas").unwrap();
        assert_eq!((image.width, image.height), (32, 32));
        assert!(image.pixels.contains(&255));
    }

    #[test]
    fn test_resize_keeps_aspect() {
        let (_, mut obs) = observers(
            r#"{ "observers": [ { "type": "pgm", "resolution": [10, 10],
                "box": { "type": "box", "ll": [0.0, 0.0], "uu": [4.0, 1.0] } } ] }"#,
        );
        obs[0].resize(200);
        let Observer::Pgm(pgm) = &obs[0] else {
            panic!("expected pgm")
        };
        assert_eq!((pgm.raster().width(), pgm.raster().height()), (200, 50));
    }

    #[test]
    fn test_oversized_rasters_are_rejected() {
        let s = scene("{}");
        let huge: ObserverConfig =
            serde_json::from_str(r#"{ "type": "pgm", "resolution": [100000, 100000],
                "box": { "type": "box", "ll": [0.0, 0.0], "uu": [1.0, 1.0] } }"#)
            .unwrap();
        assert!(matches!(
            Observer::from_config(&huge, &s.registry, false, false, "o"),
            Err(LoadError::OutOfRange { field, .. }) if field == "pgm.resolution"
        ));
        // a sliver box at the default width asks for 512 million rows
        let sliver: ObserverConfig = serde_json::from_str(
            r#"{ "type": "pgm", "box": { "type": "box", "ll": [0.0, 0.0], "uu": [1.0, 1e6] } }"#,
        )
        .unwrap();
        assert!(matches!(
            Observer::from_config(&sliver, &s.registry, false, false, "o"),
            Err(LoadError::OutOfRange { field, .. }) if field == "pgm.box"
        ));
    }

    #[test]
    fn test_oversized_resize_is_ignored() {
        let (_, mut obs) = observers(
            r#"{ "observers": [ { "type": "pgm", "resolution": [10, 10],
                "box": { "type": "box", "ll": [0.0, 0.0], "uu": [1.0, 1.0] } } ] }"#,
        );
        obs[0].resize(1 << 13);
        let Observer::Pgm(pgm) = &obs[0] else {
            panic!("expected pgm")
        };
        assert_eq!((pgm.raster().width(), pgm.raster().height()), (10, 10));
        assert!(fits(4096, 4096));
        assert!(!fits(4097, 4096));
    }
}
