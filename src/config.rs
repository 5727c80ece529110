//! Scene description
//!
//! A scene is one JSON document. Every polymorphic entry carries a `type`
//! tag; anything declared earlier can be reused with
//! `{"type": "ref", "name": "..."}`.
//!
//! ```json
//! {
//!   "simulation": { "eps": 1e-6, "dt": 1e-3, "max_steps": 5000, "linear": false },
//!   "objects": [ { "type": "circle", "pos": [0.5, 0.5], "rad": 0.5, "damp": 1.0 } ],
//!   "particles": [ { "type": "single", "pos": [0.5, 0.9], "vel": [0.1, 0.0] } ],
//!   "forces": [ { "type": "gravity", "g": -1.0 } ],
//!   "observers": [
//!     { "type": "pgm", "filename": "out.pgm", "box": { "type": "ref", "name": "boundary" } },
//!     { "type": "step", "interval": 100 }
//!   ]
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

fn unit() -> f64 {
    1.0
}

fn default_filename() -> String {
    "canvas".to_string()
}

/// Engine parameters (`simulation` key)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Collision tolerance: sub-step displacement bound and contact offset
    pub eps: f64,
    /// Outer timestep
    pub dt: f64,
    /// Steps before the run halts on its own
    pub max_steps: u64,
    /// Consume exactly `dt` per step even when collisions occur
    pub equal_time: bool,
    /// Verify every collision resolution
    pub accuracy: bool,
    /// Straight-line semi-implicit Euler instead of exact parabolic paths
    pub linear: bool,
    /// Extra log lines (per collision, per particle)
    pub verbose: bool,
    /// Draw geometry into rasters as well as trajectories
    pub record_objects: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            eps: 1e-6,
            dt: 1e-3,
            max_steps: 1000,
            equal_time: false,
            accuracy: false,
            linear: false,
            verbose: false,
            record_objects: false,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), LoadError> {
        if !(self.dt.is_finite() && self.dt > 0.0) {
            return Err(LoadError::out_of_range("simulation.dt", "must be positive"));
        }
        if !(self.eps.is_finite() && self.eps > 0.0) {
            return Err(LoadError::out_of_range("simulation.eps", "must be positive"));
        }
        Ok(())
    }
}

/// Top-level scene document
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub objects: Vec<ObjectConfig>,
    #[serde(default)]
    pub particles: Vec<ParticleConfig>,
    #[serde(default)]
    pub forces: Vec<ForceConfig>,
    #[serde(default)]
    pub neighborlist: Option<NeighborListConfig>,
    #[serde(default)]
    pub interrupts: Vec<InterruptConfig>,
    #[serde(default)]
    pub observers: Vec<ObserverConfig>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self, LoadError> {
        let config: Config = serde_json::from_str(json)?;
        config.simulation.validate()?;
        Ok(config)
    }
}

/// A reference to an earlier declaration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum NamedRef {
    #[serde(rename = "ref")]
    Ref { name: String },
}

impl NamedRef {
    pub fn name(&self) -> &str {
        match self {
            NamedRef::Ref { name } => name,
        }
    }
}

/// A rectangular region: literal bounds or the bounds of a named object
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum RegionConfig {
    #[serde(rename = "box")]
    Box { ll: [f64; 2], uu: [f64; 2] },
    #[serde(rename = "ref")]
    Ref { name: String },
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ObjectConfig {
    #[serde(rename = "circle")]
    Circle(CircleConfig),
    #[serde(rename = "masked_circle")]
    MaskedCircle(MaskedCircleConfig),
    #[serde(rename = "box")]
    Box(BoxConfig),
    #[serde(rename = "segment")]
    Segment(SegmentConfig),
    #[serde(rename = "tri-lattice")]
    TriLattice(TriLatticeConfig),
    #[serde(rename = "concentric")]
    Concentric(ConcentricConfig),
    #[serde(rename = "ref")]
    Ref { name: String },
}

impl ObjectConfig {
    /// Explicit name given to this declaration, if any
    pub fn name(&self) -> Option<&str> {
        match self {
            ObjectConfig::Circle(c) => c.name.as_deref(),
            ObjectConfig::MaskedCircle(c) => c.name.as_deref(),
            ObjectConfig::Box(c) => c.name.as_deref(),
            ObjectConfig::Segment(c) => c.name.as_deref(),
            ObjectConfig::TriLattice(c) => c.name.as_deref(),
            ObjectConfig::Concentric(c) => c.name.as_deref(),
            ObjectConfig::Ref { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ObjectConfig::Circle(_) => "circle",
            ObjectConfig::MaskedCircle(_) => "masked_circle",
            ObjectConfig::Box(_) => "box",
            ObjectConfig::Segment(_) => "segment",
            ObjectConfig::TriLattice(_) => "tri-lattice",
            ObjectConfig::Concentric(_) => "concentric",
            ObjectConfig::Ref { .. } => "ref",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircleConfig {
    pub pos: [f64; 2],
    pub rad: f64,
    #[serde(default = "unit")]
    pub damp: f64,
    #[serde(default)]
    pub absorb: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MaskedCircleConfig {
    pub pos: [f64; 2],
    pub rad: f64,
    pub mask: MaskConfig,
    #[serde(default = "unit")]
    pub damp: f64,
    #[serde(default)]
    pub absorb: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BoxConfig {
    pub ll: [f64; 2],
    pub uu: [f64; 2],
    #[serde(default = "unit")]
    pub damp: f64,
    #[serde(default)]
    pub absorb: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SegmentConfig {
    pub p0: [f64; 2],
    pub p1: [f64; 2],
    #[serde(default = "unit")]
    pub damp: f64,
    #[serde(default)]
    pub absorb: bool,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TriLatticeConfig {
    pub rows: i64,
    pub columns: i64,
    pub object: Box<ObjectConfig>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConcentricConfig {
    pub scaling_function: ScalingConfig,
    pub object: Box<ObjectConfig>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type")]
pub enum MaskConfig {
    #[serde(rename = "nholes")]
    NHoles {
        n: i64,
        gap: f64,
        #[serde(default)]
        offset: f64,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type")]
pub enum ScalingConfig {
    #[serde(rename = "linear")]
    Linear {
        min_scale: f64,
        max_scale: f64,
        steps: i64,
    },
}

// ---------------------------------------------------------------------------
// Particles, forces, neighbor list, interrupts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ParticleConfig {
    #[serde(rename = "single")]
    Single { pos: [f64; 2], vel: [f64; 2] },
    #[serde(rename = "uniform")]
    Uniform {
        p0: [f64; 2],
        p1: [f64; 2],
        v0: [f64; 2],
        v1: [f64; 2],
        #[serde(rename = "N")]
        n: i64,
    },
    #[serde(rename = "random")]
    Random {
        #[serde(rename = "box")]
        region: RegionConfig,
        v0: [f64; 2],
        v1: [f64; 2],
        #[serde(rename = "N")]
        n: i64,
        #[serde(default)]
        seed: u64,
    },
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(tag = "type")]
pub enum ForceConfig {
    #[serde(rename = "gravity")]
    Gravity { g: f64 },
    #[serde(rename = "drag")]
    Drag { gamma: f64 },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum NeighborListConfig {
    #[serde(rename = "cell")]
    Cell {
        ncells: [i64; 2],
        #[serde(default)]
        buffer: f64,
        #[serde(rename = "box")]
        region: RegionConfig,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum InterruptConfig {
    #[serde(rename = "collision")]
    Collision { object: NamedRef },
}

// ---------------------------------------------------------------------------
// Observers
// ---------------------------------------------------------------------------

/// How new samples combine with the accumulator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Blend {
    #[default]
    Add,
}

/// Mapping from accumulated intensity to output gray levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Norm {
    #[default]
    Linear,
    EqHist,
}

/// Graymap encoding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PgmFormat {
    #[default]
    Binary,
    Ascii,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum ObserverConfig {
    #[serde(rename = "pgm")]
    Pgm {
        #[serde(default = "default_filename")]
        filename: String,
        #[serde(default)]
        blend: Blend,
        #[serde(default)]
        norm: Norm,
        #[serde(rename = "box")]
        region: RegionConfig,
        #[serde(default)]
        resolution: Option<[u32; 2]>,
        #[serde(default)]
        format: PgmFormat,
    },
    #[serde(rename = "step")]
    Step { interval: i64 },
}
