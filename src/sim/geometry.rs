//! Geometric primitives and the queries the integrator runs against them
//!
//! Every surface is two-sided: a particle reflects whether it approaches a
//! wall from inside or outside. Collisions are found either analytically
//! along a straight chord ([`Primitive::segment_hit`]) or by watching the
//! sign of the signed distance flip between two nearby points
//! ([`Primitive::crossing`]).

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::mask::Mask;

/// Axis-aligned rectangle, `ll` lower-left and `uu` upper-right
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub ll: DVec2,
    pub uu: DVec2,
}

impl Rect {
    /// Build from any two opposite corners
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self {
            ll: a.min(b),
            uu: a.max(b),
        }
    }

    /// Degenerate rectangle around a single point
    pub fn point(p: DVec2) -> Self {
        Self { ll: p, uu: p }
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.uu.x - self.ll.x
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.uu.y - self.ll.y
    }

    #[inline]
    pub fn center(&self) -> DVec2 {
        (self.ll + self.uu) * 0.5
    }

    #[inline]
    pub fn half_extents(&self) -> DVec2 {
        (self.uu - self.ll) * 0.5
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.ll.x && p.x <= self.uu.x && p.y >= self.ll.y && p.y <= self.uu.y
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            ll: self.ll.min(other.ll),
            uu: self.uu.max(other.uu),
        }
    }

    pub fn expand(&self, margin: f64) -> Rect {
        let m = DVec2::splat(margin);
        Rect {
            ll: self.ll - m,
            uu: self.uu + m,
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.ll.x <= other.uu.x
            && self.uu.x >= other.ll.x
            && self.ll.y <= other.uu.y
            && self.uu.y >= other.ll.y
    }

    /// Distance from `p` to the nearest point of the filled rectangle (0 inside)
    pub fn distance_to(&self, p: DVec2) -> f64 {
        let d = (self.ll - p).max(p - self.uu).max(DVec2::ZERO);
        d.length()
    }

    /// Distance from `p` to the farthest corner
    pub fn max_distance_to(&self, p: DVec2) -> f64 {
        let d = (p - self.ll).abs().max((p - self.uu).abs());
        d.length()
    }

    /// Signed distance to the outline (negative inside)
    pub fn signed_distance(&self, p: DVec2) -> f64 {
        let q = (p - self.center()).abs() - self.half_extents();
        q.max(DVec2::ZERO).length() + q.x.max(q.y).min(0.0)
    }

    /// Outward normal of the outline nearest to `p`
    pub fn normal_at(&self, p: DVec2) -> DVec2 {
        let rel = p - self.center();
        let sign = DVec2::new(sign_of(rel.x), sign_of(rel.y));
        let q = rel.abs() - self.half_extents();
        if q.x > 0.0 && q.y > 0.0 {
            return (q * sign).normalize_or_zero();
        }
        if q.x > q.y {
            DVec2::new(sign.x, 0.0)
        } else {
            DVec2::new(0.0, sign.y)
        }
    }

    /// The four edges, counter-clockwise from the bottom
    pub fn edges(&self) -> [Segment; 4] {
        let lr = DVec2::new(self.uu.x, self.ll.y);
        let ul = DVec2::new(self.ll.x, self.uu.y);
        [
            Segment::new(self.ll, lr),
            Segment::new(lr, self.uu),
            Segment::new(self.uu, ul),
            Segment::new(ul, self.ll),
        ]
    }
}

#[inline]
fn sign_of(v: f64) -> f64 {
    if v < 0.0 { -1.0 } else { 1.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: DVec2,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub a: DVec2,
    pub b: DVec2,
}

impl Segment {
    pub fn new(a: DVec2, b: DVec2) -> Self {
        Self { a, b }
    }

    /// Unit normal, rotated a quarter turn counter-clockwise from `a → b`
    pub fn normal(&self) -> DVec2 {
        (self.b - self.a).perp().normalize_or_zero()
    }

    /// Parameter of the projection of `p` onto the segment (0 at `a`, 1 at `b`)
    pub fn project(&self, p: DVec2) -> f64 {
        let e = self.b - self.a;
        let len2 = e.length_squared();
        if len2 == 0.0 {
            return 0.0;
        }
        (p - self.a).dot(e) / len2
    }

    pub fn distance_to(&self, p: DVec2) -> f64 {
        let t = self.project(p).clamp(0.0, 1.0);
        (p - (self.a + (self.b - self.a) * t)).length()
    }

    /// Intersection of the chord `p0 → p1` with this segment
    pub fn intersect(&self, p0: DVec2, p1: DVec2) -> Option<SurfaceHit> {
        let d = p1 - p0;
        let e = self.b - self.a;
        let denom = d.perp_dot(e);
        if denom.abs() <= f64::EPSILON * d.length() * e.length() {
            return None;
        }
        let w = self.a - p0;
        let s = w.perp_dot(e) / denom;
        let u = w.perp_dot(d) / denom;
        if s > 0.0 && s <= 1.0 && (0.0..=1.0).contains(&u) {
            Some(SurfaceHit {
                s,
                point: p0 + d * s,
                normal: self.normal(),
            })
        } else {
            None
        }
    }
}

/// Where a chord meets a surface
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceHit {
    /// Fraction along the chord, in (0, 1]
    pub s: f64,
    pub point: DVec2,
    /// Unit surface normal at `point` (sign is a property of the surface, not the approach side)
    pub normal: DVec2,
}

/// A static geometric primitive
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Primitive {
    Circle(Circle),
    MaskedCircle(Circle, Mask),
    Box(Rect),
    Segment(Segment),
}

impl Primitive {
    pub fn kind(&self) -> &'static str {
        match self {
            Primitive::Circle(_) => "circle",
            Primitive::MaskedCircle(..) => "masked_circle",
            Primitive::Box(_) => "box",
            Primitive::Segment(_) => "segment",
        }
    }

    /// Anchor used for scaling and lattice placement
    pub fn center(&self) -> DVec2 {
        match self {
            Primitive::Circle(c) | Primitive::MaskedCircle(c, _) => c.center,
            Primitive::Box(r) => r.center(),
            Primitive::Segment(s) => (s.a + s.b) * 0.5,
        }
    }

    /// Whether the point lies in the solid region
    ///
    /// For a masked circle the point must be inside the radius and at an
    /// angle where the wall is solid. Segments enclose nothing.
    pub fn contains(&self, p: DVec2) -> bool {
        match self {
            Primitive::Circle(c) => (p - c.center).length() <= c.radius,
            Primitive::MaskedCircle(c, mask) => {
                let rel = p - c.center;
                rel.length() <= c.radius && mask.is_solid(rel.y.atan2(rel.x))
            }
            Primitive::Box(r) => r.contains(p),
            Primitive::Segment(_) => false,
        }
    }

    /// Signed distance to the surface; the sign tells which side `p` is on
    pub fn signed_distance(&self, p: DVec2) -> f64 {
        match self {
            Primitive::Circle(c) | Primitive::MaskedCircle(c, _) => (p - c.center).length() - c.radius,
            Primitive::Box(r) => r.signed_distance(p),
            Primitive::Segment(s) => s.normal().dot(p - s.a),
        }
    }

    /// Unsigned distance to the surface, ignoring masks
    ///
    /// Never larger than the true distance to a solid part of the wall.
    pub fn clearance(&self, p: DVec2) -> f64 {
        match self {
            Primitive::Segment(s) => s.distance_to(p),
            _ => self.signed_distance(p).abs(),
        }
    }

    /// Unit surface normal at (or near) a surface point
    pub fn normal_at(&self, p: DVec2) -> DVec2 {
        match self {
            Primitive::Circle(c) | Primitive::MaskedCircle(c, _) => {
                let n = (p - c.center).normalize_or_zero();
                if n == DVec2::ZERO { DVec2::X } else { n }
            }
            Primitive::Box(r) => r.normal_at(p),
            Primitive::Segment(s) => s.normal(),
        }
    }

    /// Whether the surface point `p` belongs to a solid part of the wall
    pub fn solid_at(&self, p: DVec2) -> bool {
        match self {
            Primitive::MaskedCircle(c, mask) => {
                let rel = p - c.center;
                mask.is_solid(rel.y.atan2(rel.x))
            }
            Primitive::Segment(s) => (0.0..=1.0).contains(&s.project(p)),
            Primitive::Circle(_) | Primitive::Box(_) => true,
        }
    }

    /// Surface crossing between two nearby points, detected by a sign flip
    pub fn crossing(&self, p0: DVec2, p1: DVec2) -> Option<SurfaceHit> {
        let d0 = self.signed_distance(p0);
        let d1 = self.signed_distance(p1);
        if (d0 >= 0.0) == (d1 >= 0.0) {
            return None;
        }
        let s = (d0 / (d0 - d1)).clamp(0.0, 1.0);
        let point = p0 + (p1 - p0) * s;
        if !self.solid_at(point) {
            return None;
        }
        Some(SurfaceHit {
            s: s.max(f64::MIN_POSITIVE),
            point,
            normal: self.normal_at(point),
        })
    }

    /// Earliest solid intersection of the straight chord `p0 → p1`
    pub fn segment_hit(&self, p0: DVec2, p1: DVec2) -> Option<SurfaceHit> {
        match self {
            Primitive::Circle(c) => circle_hit(c, None, p0, p1),
            Primitive::MaskedCircle(c, mask) => circle_hit(c, Some(mask), p0, p1),
            Primitive::Box(r) => r
                .edges()
                .iter()
                .filter_map(|edge| edge.intersect(p0, p1))
                .min_by(|a, b| a.s.total_cmp(&b.s))
                .map(|hit| SurfaceHit {
                    normal: r.normal_at(hit.point),
                    ..hit
                }),
            Primitive::Segment(s) => s.intersect(p0, p1),
        }
    }

    /// Bounding rectangle of the surface
    pub fn bounds(&self) -> Rect {
        match self {
            Primitive::Circle(c) | Primitive::MaskedCircle(c, _) => {
                let r = DVec2::splat(c.radius);
                Rect {
                    ll: c.center - r,
                    uu: c.center + r,
                }
            }
            Primitive::Box(r) => *r,
            Primitive::Segment(s) => Rect::new(s.a, s.b),
        }
    }

    /// Whether the surface may come within `buffer` of the rectangle
    pub fn touches(&self, rect: &Rect, buffer: f64) -> bool {
        match self {
            Primitive::Circle(c) | Primitive::MaskedCircle(c, _) => {
                rect.distance_to(c.center) <= c.radius + buffer
                    && rect.max_distance_to(c.center) >= c.radius - buffer
            }
            Primitive::Box(r) => {
                let outer = r.expand(buffer);
                let inner = r.expand(-buffer);
                let inside_hole = inner.width() > 0.0
                    && inner.height() > 0.0
                    && inner.contains(rect.ll)
                    && inner.contains(rect.uu);
                outer.intersects(rect) && !inside_hole
            }
            Primitive::Segment(s) => Rect::new(s.a, s.b).expand(buffer).intersects(rect),
        }
    }

    /// Copy scaled by `k` about [`Primitive::center`]
    pub fn scaled(&self, k: f64) -> Primitive {
        match *self {
            Primitive::Circle(c) => Primitive::Circle(Circle {
                radius: c.radius * k,
                ..c
            }),
            Primitive::MaskedCircle(c, mask) => Primitive::MaskedCircle(
                Circle {
                    radius: c.radius * k,
                    ..c
                },
                mask,
            ),
            Primitive::Box(r) => {
                let h = r.half_extents() * k;
                let c = r.center();
                Primitive::Box(Rect { ll: c - h, uu: c + h })
            }
            Primitive::Segment(s) => {
                let m = (s.a + s.b) * 0.5;
                Primitive::Segment(Segment::new(m + (s.a - m) * k, m + (s.b - m) * k))
            }
        }
    }

    /// Copy moved by `offset`
    pub fn translated(&self, offset: DVec2) -> Primitive {
        match *self {
            Primitive::Circle(c) => Primitive::Circle(Circle {
                center: c.center + offset,
                ..c
            }),
            Primitive::MaskedCircle(c, mask) => Primitive::MaskedCircle(
                Circle {
                    center: c.center + offset,
                    ..c
                },
                mask,
            ),
            Primitive::Box(r) => Primitive::Box(Rect {
                ll: r.ll + offset,
                uu: r.uu + offset,
            }),
            Primitive::Segment(s) => Primitive::Segment(Segment::new(s.a + offset, s.b + offset)),
        }
    }

    /// Solid parts of the outline as straight chords, for drawing
    pub fn outline(&self, samples: usize) -> Vec<(DVec2, DVec2)> {
        match self {
            Primitive::Circle(c) | Primitive::MaskedCircle(c, _) => {
                let n = samples.max(8);
                let point = |i: usize| {
                    let theta = std::f64::consts::TAU * i as f64 / n as f64;
                    c.center + DVec2::new(theta.cos(), theta.sin()) * c.radius
                };
                (0..n)
                    .map(|i| (point(i), point(i + 1)))
                    .filter(|(a, b)| self.solid_at((*a + *b) * 0.5))
                    .collect()
            }
            Primitive::Box(r) => r.edges().iter().map(|e| (e.a, e.b)).collect(),
            Primitive::Segment(s) => vec![(s.a, s.b)],
        }
    }
}

/// Chord–circle intersection, honoring the mask at each root in order
fn circle_hit(c: &Circle, mask: Option<&Mask>, p0: DVec2, p1: DVec2) -> Option<SurfaceHit> {
    let d = p1 - p0;
    let f = p0 - c.center;
    let a = d.length_squared();
    if a == 0.0 {
        return None;
    }
    let b = 2.0 * f.dot(d);
    let cc = f.length_squared() - c.radius * c.radius;
    let disc = b * b - 4.0 * a * cc;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let roots = [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)];
    for s in roots {
        if !(s > 0.0 && s <= 1.0) {
            continue;
        }
        let point = p0 + d * s;
        let rel = point - c.center;
        if let Some(mask) = mask {
            if mask.is_open(rel.y.atan2(rel.x)) {
                continue;
            }
        }
        let normal = rel.normalize_or_zero();
        return Some(SurfaceHit {
            s,
            point,
            normal: if normal == DVec2::ZERO { DVec2::X } else { normal },
        });
    }
    None
}

/// Reflect velocity off a surface with given normal
#[inline]
pub fn reflect(vel: DVec2, normal: DVec2) -> DVec2 {
    vel - 2.0 * vel.dot(normal) * normal
}
