//! Per-particle acceleration terms
//!
//! Every term is a stateless function of one particle's state. Terms are
//! summed into a zeroed accumulator, so declaration order does not matter.

use glam::DVec2;

use super::particles::Particle;
use crate::config::ForceConfig;

/// An acceleration contribution (mass is 1 for every particle)
pub trait Acceleration: std::fmt::Debug {
    fn acceleration(&self, p: &Particle) -> DVec2;

    /// Short description for `log_simulation`
    fn describe(&self) -> String;
}

/// Constant acceleration `(0, g)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Gravity {
    pub g: f64,
}

impl Acceleration for Gravity {
    fn acceleration(&self, _p: &Particle) -> DVec2 {
        DVec2::new(0.0, self.g)
    }

    fn describe(&self) -> String {
        format!("gravity g={}", self.g)
    }
}

/// Linear drag `-gamma * v`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drag {
    pub gamma: f64,
}

impl Acceleration for Drag {
    fn acceleration(&self, p: &Particle) -> DVec2 {
        -self.gamma * p.vel
    }

    fn describe(&self) -> String {
        format!("drag gamma={}", self.gamma)
    }
}

/// The fixed set of acceleration terms for a run
#[derive(Debug, Default)]
pub struct AccelSet {
    terms: Vec<Box<dyn Acceleration + Send + Sync>>,
}

impl AccelSet {
    pub fn new() -> Self {
        Self { terms: Vec::new() }
    }

    /// Add an acceleration term
    pub fn with<T>(mut self, term: T) -> Self
    where
        T: Acceleration + Send + Sync + 'static,
    {
        self.terms.push(Box::new(term));
        self
    }

    pub fn from_config(forces: &[ForceConfig]) -> Self {
        forces.iter().fold(Self::new(), |set, f| match *f {
            ForceConfig::Gravity { g } => set.with(Gravity { g }),
            ForceConfig::Drag { gamma } => set.with(Drag { gamma }),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Total acceleration on one particle
    pub fn total(&self, p: &Particle) -> DVec2 {
        let mut a = DVec2::ZERO;
        for term in &self.terms {
            a += term.acceleration(p);
        }
        a
    }

    pub fn describe(&self) -> Vec<String> {
        self.terms.iter().map(|t| t.describe()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(vel: DVec2) -> Particle {
        Particle::new(0, DVec2::ZERO, vel)
    }

    #[test]
    fn test_gravity_is_constant() {
        let set = AccelSet::new().with(Gravity { g: -1.0 });
        let a = set.total(&particle(DVec2::new(3.0, 4.0)));
        assert_eq!(a, DVec2::new(0.0, -1.0));
    }

    #[test]
    fn test_drag_opposes_velocity() {
        let set = AccelSet::new().with(Drag { gamma: 0.5 });
        let a = set.total(&particle(DVec2::new(2.0, -2.0)));
        assert_eq!(a, DVec2::new(-1.0, 1.0));
    }

    #[test]
    fn test_order_does_not_matter() {
        let p = particle(DVec2::new(0.3, -0.7));
        let ab = AccelSet::from_config(&[
            ForceConfig::Gravity { g: -9.81 },
            ForceConfig::Drag { gamma: 0.1 },
        ]);
        let ba = AccelSet::from_config(&[
            ForceConfig::Drag { gamma: 0.1 },
            ForceConfig::Gravity { g: -9.81 },
        ]);
        assert_eq!(ab.total(&p), ba.total(&p));
    }

    #[test]
    fn test_empty_set_is_zero() {
        assert_eq!(AccelSet::new().total(&particle(DVec2::ONE)), DVec2::ZERO);
    }
}
