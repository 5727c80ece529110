//! Shapes: geometry plus surface properties
//!
//! A [`Shape`] is what particles collide with. Its geometry is either a
//! fixed [`Primitive`] or a [`Concentric`] wrapper whose scale follows the
//! step counter. `tri-lattice` never appears here: [`expand_tri_lattice`]
//! turns it into independent primitives while the scene loads.

use glam::DVec2;

use super::geometry::{Primitive, Rect, Segment};
use crate::consts::LATTICE_CONSTANT;

/// Index of a shape inside the simulation's shape list
pub type ShapeId = usize;

/// Deterministic scale schedule driven by the step counter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub min_scale: f64,
    pub max_scale: f64,
    pub steps: u64,
}

impl Scaling {
    /// Linear from `min_scale` at step 0 to `max_scale` at `steps`, then held
    pub fn current_scale(&self, step: u64) -> f64 {
        if step >= self.steps {
            return self.max_scale;
        }
        let t = step as f64 / self.steps as f64;
        self.min_scale + (self.max_scale - self.min_scale) * t
    }
}

/// A base primitive rescaled about its center every step
#[derive(Debug, Clone, PartialEq)]
pub struct Concentric {
    pub base: Primitive,
    pub scaling: Scaling,
    step: u64,
}

impl Concentric {
    pub fn new(base: Primitive, scaling: Scaling) -> Self {
        Self {
            base,
            scaling,
            step: 0,
        }
    }

    pub fn current_scale(&self) -> f64 {
        self.scaling.current_scale(self.step)
    }

    pub fn current(&self) -> Primitive {
        self.base.scaled(self.current_scale())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Static(Primitive),
    Concentric(Concentric),
}

/// A collidable object
#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub geometry: Geometry,
    /// Multiplier applied to the reflected velocity
    pub damp: f64,
    /// Remove particles that hit this shape
    pub absorb: bool,
    /// Human-readable label for logs
    pub label: String,
}

impl Shape {
    pub fn new(geometry: Geometry, damp: f64, absorb: bool, label: impl Into<String>) -> Self {
        Self {
            geometry,
            damp,
            absorb,
            label: label.into(),
        }
    }

    /// Geometry as of the current step
    #[inline]
    pub fn current(&self) -> Primitive {
        match &self.geometry {
            Geometry::Static(p) => *p,
            Geometry::Concentric(c) => c.current(),
        }
    }

    #[inline]
    pub fn damping(&self) -> f64 {
        self.damp
    }

    pub fn contains(&self, p: DVec2) -> bool {
        self.current().contains(p)
    }

    pub fn signed_distance(&self, p: DVec2) -> f64 {
        self.current().signed_distance(p)
    }

    /// Geometry that changes with the step counter
    pub fn is_dynamic(&self) -> bool {
        matches!(self.geometry, Geometry::Concentric(_))
    }

    /// Move step-dependent geometry to `step`
    pub fn set_step(&mut self, step: u64) {
        if let Geometry::Concentric(c) = &mut self.geometry {
            c.step = step;
        }
    }

    pub fn bounds(&self) -> Rect {
        self.current().bounds()
    }

    /// Largest extent over the whole scale schedule
    pub fn max_bounds(&self) -> Rect {
        match &self.geometry {
            Geometry::Static(p) => p.bounds(),
            Geometry::Concentric(c) => {
                let lo = c.base.scaled(c.scaling.min_scale).bounds();
                let hi = c.base.scaled(c.scaling.max_scale).bounds();
                lo.union(&hi)
            }
        }
    }
}

/// Output of a `tri-lattice` expansion
#[derive(Debug, Clone)]
pub struct LatticeExpansion {
    /// `rows * columns` translated copies of the template
    pub instances: Vec<Primitive>,
    /// Open-top container walls, with their implicit names
    pub walls: Vec<(&'static str, Segment)>,
}

/// Expand a template into a triangular lattice with a container around it
///
/// Row `r` sits `r * √3/2` above the first row and odd rows shift right by
/// half a lattice constant.
pub fn expand_tri_lattice(template: Primitive, rows: u32, columns: u32) -> LatticeExpansion {
    let a = LATTICE_CONSTANT;
    let row_height = a * 3f64.sqrt() * 0.5;

    let mut instances = Vec::with_capacity(rows as usize * columns as usize);
    for r in 0..rows {
        let shift = if r % 2 == 1 { 0.5 * a } else { 0.0 };
        for c in 0..columns {
            let offset = DVec2::new(f64::from(c) * a + shift, f64::from(r) * row_height);
            instances.push(template.translated(offset));
        }
    }

    let width = (f64::from(columns) + 0.5) * a;
    let top = instances
        .iter()
        .map(|p| p.bounds().uu.y)
        .fold(0.0_f64, f64::max);
    let height = width.max(top + a);

    let walls = vec![
        ("left", Segment::new(DVec2::new(0.0, height), DVec2::ZERO)),
        ("bottom", Segment::new(DVec2::ZERO, DVec2::new(width, 0.0))),
        ("right", Segment::new(DVec2::new(width, 0.0), DVec2::new(width, height))),
    ];

    LatticeExpansion { instances, walls }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::geometry::Circle;
    use proptest::prelude::*;

    fn peg() -> Primitive {
        Primitive::Circle(Circle {
            center: DVec2::new(0.5, 0.5),
            radius: 0.45,
        })
    }

    #[test]
    fn test_lattice_instance_count() {
        let lattice = expand_tri_lattice(peg(), 4, 8);
        assert_eq!(lattice.instances.len(), 32);
        for p in &lattice.instances {
            match p {
                Primitive::Circle(c) => assert_eq!(c.radius, 0.45),
                other => panic!("unexpected {}", other.kind()),
            }
        }
    }

    #[test]
    fn test_lattice_rows_are_staggered() {
        let lattice = expand_tri_lattice(peg(), 2, 3);
        let first = lattice.instances[0].center();
        let second_row = lattice.instances[3].center();
        assert!((second_row.x - first.x - 0.5).abs() < 1e-12);
        assert!((second_row.y - first.y - 3f64.sqrt() / 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_lattice_container_encloses_pegs() {
        let lattice = expand_tri_lattice(peg(), 4, 8);
        assert_eq!(lattice.walls.len(), 3);
        assert_eq!(lattice.walls[1].0, "bottom");
        let right = lattice.walls[2].1.a.x;
        let top = lattice.walls[0].1.a.y;
        for p in &lattice.instances {
            let b = p.bounds();
            assert!(b.ll.x >= 0.0 && b.ll.y >= 0.0);
            assert!(b.uu.x <= right && b.uu.y <= top);
        }
    }

    #[test]
    fn test_concentric_follows_schedule() {
        let scaling = Scaling {
            min_scale: 1.0,
            max_scale: 4.0,
            steps: 150,
        };
        let mut shape = Shape::new(
            Geometry::Concentric(Concentric::new(peg(), scaling)),
            1.0,
            false,
            "concentric",
        );
        assert!(shape.is_dynamic());
        shape.set_step(150);
        match shape.current() {
            Primitive::Circle(c) => assert!((c.radius - 1.8).abs() < 1e-12),
            other => panic!("unexpected {}", other.kind()),
        }
        let max = shape.max_bounds();
        assert!((max.width() - 3.6).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn scale_endpoints_and_monotonic(
            min in 0.1f64..5.0,
            extra in 0.001f64..5.0,
            steps in 1u64..10_000,
            a in 0u64..20_000,
            b in 0u64..20_000,
        ) {
            let s = Scaling { min_scale: min, max_scale: min + extra, steps };
            prop_assert_eq!(s.current_scale(0), min);
            prop_assert_eq!(s.current_scale(steps), min + extra);
            prop_assert_eq!(s.current_scale(steps + 7), min + extra);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(s.current_scale(lo) <= s.current_scale(hi));
        }
    }
}
