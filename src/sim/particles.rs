//! Particles and the generators that create them at load time

use glam::DVec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::geometry::Rect;
use crate::error::LoadError;

/// A point particle (mass 1)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub id: u64,
    pub pos: DVec2,
    pub vel: DVec2,
    pub alive: bool,
    /// Collisions resolved so far
    pub bounces: u64,
    /// Simulated time this particle has lived through
    pub time: f64,
}

impl Particle {
    pub fn new(id: u64, pos: DVec2, vel: DVec2) -> Self {
        Self {
            id,
            pos,
            vel,
            alive: true,
            bounces: 0,
            time: 0.0,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.pos.is_finite() && self.vel.is_finite()
    }
}

/// A load-time particle generator
#[derive(Debug, Clone, PartialEq)]
pub enum Generator {
    Single {
        pos: DVec2,
        vel: DVec2,
    },
    /// `n` particles interpolated linearly between two endpoint pairs
    Uniform {
        p0: DVec2,
        p1: DVec2,
        v0: DVec2,
        v1: DVec2,
        n: u64,
    },
    /// `n` particles drawn uniformly from a region, seeded
    Random {
        region: Rect,
        v0: DVec2,
        v1: DVec2,
        n: u64,
        seed: u64,
    },
}

/// Checks a declared particle count
pub fn particle_count(n: i64) -> Result<u64, LoadError> {
    u64::try_from(n).map_err(|_| LoadError::out_of_range("particles.N", "must not be negative"))
}

impl Generator {
    /// Append the generated particles, numbering them from `next_id`
    pub fn generate(&self, next_id: &mut u64, out: &mut Vec<Particle>) {
        let mut push = |pos: DVec2, vel: DVec2| {
            out.push(Particle::new(*next_id, pos, vel));
            *next_id += 1;
        };
        match *self {
            Generator::Single { pos, vel } => push(pos, vel),
            Generator::Uniform { p0, p1, v0, v1, n } => {
                if n == 1 {
                    push(p0, v0);
                    return;
                }
                let last = n.saturating_sub(1);
                for i in 0..n {
                    let (pos, vel) = if i == last {
                        (p1, v1)
                    } else {
                        let t = i as f64 / last as f64;
                        (p0 + (p1 - p0) * t, v0 + (v1 - v0) * t)
                    };
                    push(pos, vel);
                }
            }
            Generator::Random {
                region,
                v0,
                v1,
                n,
                seed,
            } => {
                let mut rng = Pcg32::seed_from_u64(seed);
                for _ in 0..n {
                    let u = DVec2::new(rng.random::<f64>(), rng.random::<f64>());
                    let w = DVec2::new(rng.random::<f64>(), rng.random::<f64>());
                    let pos = region.ll + (region.uu - region.ll) * u;
                    let vel = v0 + (v1 - v0) * w;
                    push(pos, vel);
                }
            }
        }
    }
}
