//! Plinko - a configurable 2D particle simulator
//!
//! Core modules:
//! - `sim`: Deterministic simulation (geometry, masks, forces, integrator, interrupts)
//! - `observer`: Raster accumulation, PGM export and periodic status lines
//! - `config`: JSON scene description
//! - `platform`: Output sinks and host bindings (native files, browser canvas)
//!
//! A run is driven through [`Simulation`]: build it from a JSON document with
//! [`create_simulation`], then call [`Simulation::run`].

pub mod config;
pub mod error;
pub mod observer;
pub mod platform;
pub mod sim;
pub mod simulation;

pub use error::{Error, LoadError, NumericalError};
pub use platform::{MemorySink, OutputSink};
pub use simulation::{CancelToken, Halt, RunResult, Simulation, create_simulation};

/// Engine constants
pub mod consts {
    /// Deepest bisection allowed when sub-stepping a parabolic path
    pub const MAX_BISECTION_DEPTH: u32 = 48;
    /// Collisions a single particle may resolve inside one outer step
    pub const MAX_COLLISIONS_PER_STEP: u32 = 4096;

    /// Default raster width when an observer does not give a resolution
    pub const DEFAULT_RASTER_WIDTH: u32 = 512;
    /// Most pixels one raster may hold (4096 x 4096)
    pub const MAX_RASTER_PIXELS: u64 = 1 << 24;
    /// Largest sample value written to a graymap
    pub const PGM_MAX_VALUE: u16 = 255;

    /// Lattice constant of `tri-lattice` expansions
    pub const LATTICE_CONSTANT: f64 = 1.0;
}

/// Normalized angle to [-π, π)
#[inline]
pub fn normalize_angle(mut angle: f64) -> f64 {
    use std::f64::consts::{PI, TAU};
    if !angle.is_finite() {
        return angle;
    }
    angle = angle.rem_euclid(TAU);
    if angle >= PI {
        angle -= TAU;
    }
    angle
}
