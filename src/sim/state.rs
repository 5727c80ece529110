//! Simulation state and the per-step records handed to observers
//!
//! Everything that changes while a run advances lives in [`World`]. It is
//! advanced only by [`super::tick::tick`], so two worlds built from the same
//! scene stay bit-identical step for step.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::forces::AccelSet;
use super::neighborlist::Broadphase;
use super::particles::Particle;
use super::shape::{Shape, ShapeId};
use crate::config::SimulationConfig;

/// Integration parameters fixed for a run
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Params {
    pub eps: f64,
    pub dt: f64,
    pub equal_time: bool,
    pub accuracy: bool,
    pub linear: bool,
    pub verbose: bool,
}

impl From<&SimulationConfig> for Params {
    fn from(cfg: &SimulationConfig) -> Self {
        Self {
            eps: cfg.eps,
            dt: cfg.dt,
            equal_time: cfg.equal_time,
            accuracy: cfg.accuracy,
            linear: cfg.linear,
            verbose: cfg.verbose,
        }
    }
}

/// A resolved collision
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionEvent {
    pub particle: u64,
    pub shape: ShapeId,
    /// Particle clock at contact
    pub time: f64,
    pub point: DVec2,
}

/// What happened during one step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepFrame {
    /// Step counter after the step
    pub step: u64,
    pub time: f64,
    /// Straight chords travelled by live particles (start → contacts → end)
    pub paths: Vec<(DVec2, DVec2)>,
    pub events: Vec<CollisionEvent>,
}

impl StepFrame {
    pub fn clear(&mut self) {
        self.paths.clear();
        self.events.clear();
    }
}

/// Geometry, particles and forces of a running simulation
#[derive(Debug)]
pub struct World {
    pub params: Params,
    pub shapes: Vec<Shape>,
    /// Sorted by id
    pub particles: Vec<Particle>,
    pub forces: AccelSet,
    pub broadphase: Broadphase,
    /// Steps completed
    pub step: u64,
    /// Run clock: the furthest any particle clock has advanced
    pub time: f64,
}

impl World {
    pub fn new(
        params: Params,
        shapes: Vec<Shape>,
        particles: Vec<Particle>,
        forces: AccelSet,
        broadphase: Broadphase,
    ) -> Self {
        Self {
            params,
            shapes,
            particles,
            forces,
            broadphase,
            step: 0,
            time: 0.0,
        }
    }

    pub fn alive_count(&self) -> usize {
        self.particles.iter().filter(|p| p.alive).count()
    }

    pub fn total_bounces(&self) -> u64 {
        self.particles.iter().map(|p| p.bounces).sum()
    }
}
