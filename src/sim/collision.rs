//! Narrow-phase collision detection and response
//!
//! Two strategies find the first surface a particle meets inside one
//! interval of motion:
//!
//! - [`linear_hit`] intersects the straight chord analytically against each
//!   candidate.
//! - [`parabolic_hit`] follows the exact constant-acceleration path and
//!   bisects the interval until each piece moves less than `eps`, skipping
//!   pieces that cannot reach any surface. A sign change of the signed
//!   distance inside a leaf is a collision.
//!
//! Either way the earliest contact wins and ties go to the lower shape index.

use glam::DVec2;

use super::geometry::{Primitive, Rect, reflect};
use super::shape::{Shape, ShapeId};
use crate::consts::MAX_BISECTION_DEPTH;

/// Constant-acceleration motion from a known state
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    pub pos: DVec2,
    pub vel: DVec2,
    pub acc: DVec2,
}

impl Trajectory {
    #[inline]
    pub fn at(&self, t: f64) -> DVec2 {
        self.pos + self.vel * t + self.acc * (0.5 * t * t)
    }

    #[inline]
    pub fn velocity_at(&self, t: f64) -> DVec2 {
        self.vel + self.acc * t
    }

    /// Bounding box of the path over `[0, tau]`
    pub fn bounds(&self, tau: f64) -> Rect {
        let mut rect = Rect::new(self.pos, self.at(tau));
        // per-axis turning points
        for axis in 0..2 {
            let (v, a) = (self.vel[axis], self.acc[axis]);
            if a != 0.0 {
                let t = -v / a;
                if t > 0.0 && t < tau {
                    let p = self.at(t);
                    rect = rect.union(&Rect::point(p));
                }
            }
        }
        rect
    }

    /// Largest possible displacement over `[t0, t0 + tau]`
    #[inline]
    fn reach(&self, t0: f64, tau: f64) -> f64 {
        self.velocity_at(t0).length() * tau + 0.5 * self.acc.length() * tau * tau
    }
}

/// The first surface met during an interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub shape: ShapeId,
    /// Time from the start of the interval
    pub t: f64,
    pub point: DVec2,
    pub normal: DVec2,
    /// Start of the chord the contact was found on
    pub from: DVec2,
}

/// Bisection ran past [`MAX_BISECTION_DEPTH`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthExceeded;

/// Earliest hit of the straight path `pos → pos + vel * tau`
pub fn linear_hit(
    shapes: &[Shape],
    candidates: &[ShapeId],
    pos: DVec2,
    vel: DVec2,
    tau: f64,
) -> Option<Contact> {
    let end = pos + vel * tau;
    let mut best: Option<Contact> = None;
    for &id in candidates {
        let Some(hit) = shapes[id].current().segment_hit(pos, end) else {
            continue;
        };
        let t = hit.s * tau;
        if best.is_none_or(|b| t < b.t) {
            best = Some(Contact {
                shape: id,
                t,
                point: hit.point,
                normal: hit.normal,
                from: pos,
            });
        }
    }
    best
}

/// Earliest hit along a parabolic path over `[0, tau]`
pub fn parabolic_hit(
    shapes: &[Shape],
    candidates: &[ShapeId],
    path: &Trajectory,
    tau: f64,
    eps: f64,
) -> Result<Option<Contact>, DepthExceeded> {
    if candidates.is_empty() || tau <= 0.0 {
        return Ok(None);
    }
    let geometry: Vec<(ShapeId, Primitive)> = candidates
        .iter()
        .map(|&id| (id, shapes[id].current()))
        .collect();

    // Depth-first, earlier half first, so the first leaf hit is the earliest
    let mut stack = vec![(0.0_f64, tau, 0_u32)];
    while let Some((t0, t1, depth)) = stack.pop() {
        let span = t1 - t0;
        let start = path.at(t0);
        let reach = path.reach(t0, span);
        let near = geometry.iter().any(|(_, g)| g.clearance(start) <= reach);
        if !near {
            continue;
        }
        if reach <= eps {
            let end = path.at(t1);
            let mut best: Option<Contact> = None;
            for (id, g) in &geometry {
                if g.clearance(start) > reach {
                    continue;
                }
                if let Some(hit) = g.crossing(start, end) {
                    let t = t0 + hit.s * span;
                    if best.is_none_or(|b| t < b.t) {
                        best = Some(Contact {
                            shape: *id,
                            t,
                            point: hit.point,
                            normal: hit.normal,
                            from: start,
                        });
                    }
                }
            }
            if best.is_some() {
                return Ok(best);
            }
            continue;
        }
        if depth >= MAX_BISECTION_DEPTH {
            return Err(DepthExceeded);
        }
        let mid = t0 + 0.5 * span;
        stack.push((mid, t1, depth + 1));
        stack.push((t0, mid, depth + 1));
    }
    Ok(None)
}

/// Post-collision state of a particle
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounce {
    pub pos: DVec2,
    pub vel: DVec2,
}

/// Reflect `vel_in` off the contact, scale by `damp`, and back the particle
/// off the surface by `eps` on the side it arrived from
pub fn bounce(contact: &Contact, vel_in: DVec2, damp: f64, eps: f64) -> Bounce {
    let side = if vel_in.dot(contact.normal) > 0.0 { -1.0 } else { 1.0 };
    Bounce {
        pos: contact.point + contact.normal * (side * eps),
        vel: reflect(vel_in, contact.normal) * damp,
    }
}

/// Whether a resolved position sits within `2 * eps` of the surface on the
/// side of `from`
pub fn is_consistent(surface: &Primitive, from: DVec2, resolved: DVec2, eps: f64) -> bool {
    let before = surface.signed_distance(from);
    let after = surface.signed_distance(resolved);
    after.abs() <= 2.0 * eps && after != 0.0 && (before > 0.0) == (after > 0.0)
}
