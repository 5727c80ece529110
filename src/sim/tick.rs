//! Fixed timestep integrator
//!
//! Advances every live particle by one outer step, resolving collisions on
//! the way, then moves step-dependent geometry forward.

use glam::DVec2;
use log::info;

use super::collision::{Trajectory, bounce, is_consistent, linear_hit, parabolic_hit};
use super::forces::AccelSet;
use super::geometry::reflect;
use super::neighborlist::Broadphase;
use super::particles::Particle;
use super::shape::{Shape, ShapeId};
use super::state::{CollisionEvent, Params, StepFrame, World};
use crate::consts::MAX_COLLISIONS_PER_STEP;
use crate::error::NumericalError;

/// Read-only view of the scene shared by every particle in a step
struct StepContext<'a> {
    params: Params,
    shapes: &'a [Shape],
    forces: &'a AccelSet,
    broadphase: &'a Broadphase,
    /// Number of the step being computed
    step: u64,
}

/// Advance the world by one outer step
///
/// On success `frame` holds the chords and collisions of this step. On error
/// the world is left mid-step and must not be advanced again.
pub fn tick(world: &mut World, frame: &mut StepFrame) -> Result<(), NumericalError> {
    frame.clear();
    let ctx = StepContext {
        params: world.params,
        shapes: &world.shapes,
        forces: &world.forces,
        broadphase: &world.broadphase,
        step: world.step + 1,
    };

    let mut candidates = Vec::new();
    for particle in world.particles.iter_mut().filter(|p| p.alive) {
        advance(particle, &ctx, &mut candidates, frame)?;
    }

    world.step += 1;
    let before = sides_before_update(world);
    for shape in &mut world.shapes {
        shape.set_step(world.step);
    }
    resolve_sweeps(world, &before, frame);
    world.broadphase.refresh(&world.shapes);

    if let Some(p) = world.particles.iter().find(|p| p.alive && !p.is_finite()) {
        return Err(NumericalError::NonFinite {
            particle: p.id,
            step: world.step,
        });
    }

    world.time = if world.particles.is_empty() {
        world.step as f64 * world.params.dt
    } else {
        world.particles.iter().map(|p| p.time).fold(world.time, f64::max)
    };
    frame.step = world.step;
    frame.time = world.time;
    Ok(())
}

/// Signed distance of every live particle to every moving shape, taken
/// before the geometry advances
fn sides_before_update(world: &World) -> Vec<(usize, ShapeId, f64)> {
    let moving: Vec<ShapeId> = (0..world.shapes.len())
        .filter(|&id| world.shapes[id].is_dynamic())
        .collect();
    if moving.is_empty() {
        return Vec::new();
    }
    let mut sides = Vec::new();
    for (i, p) in world.particles.iter().enumerate().filter(|(_, p)| p.alive) {
        for &id in &moving {
            sides.push((i, id, world.shapes[id].signed_distance(p.pos)));
        }
    }
    sides
}

/// A surface that moved past a particle collides with it: the particle is
/// put back `eps` off the surface on its old side
fn resolve_sweeps(world: &mut World, before: &[(usize, ShapeId, f64)], frame: &mut StepFrame) {
    let eps = world.params.eps;
    for &(i, id, d0) in before {
        let p = &mut world.particles[i];
        if !p.alive {
            continue;
        }
        let shape = &world.shapes[id];
        let surface = shape.current();
        let d1 = surface.signed_distance(p.pos);
        if (d0 >= 0.0) == (d1 >= 0.0) || !surface.solid_at(p.pos) {
            continue;
        }
        let normal = surface.normal_at(p.pos);
        let side = if d0 >= 0.0 { 1.0 } else { -1.0 };
        let point = p.pos - normal * d1;
        p.pos = point + normal * (side * eps);
        if p.vel.dot(normal) * side < 0.0 {
            p.vel = reflect(p.vel, normal);
        }
        p.vel *= shape.damping();
        p.bounces += 1;
        frame.events.push(CollisionEvent {
            particle: p.id,
            shape: id,
            time: p.time,
            point,
        });
        if world.params.verbose {
            info!(
                "object {id} '{}' swept particle {} at ({:.6}, {:.6})",
                shape.label, p.id, point.x, point.y
            );
        }
        if shape.absorb {
            p.alive = false;
        }
    }
}

/// Move one particle through its share of the step
fn advance(
    p: &mut Particle,
    ctx: &StepContext<'_>,
    candidates: &mut Vec<ShapeId>,
    frame: &mut StepFrame,
) -> Result<(), NumericalError> {
    let params = ctx.params;
    let mut acc = ctx.forces.total(p);
    let mut kick = DVec2::ZERO;
    if params.linear {
        // semi-implicit Euler: kick, then drift on a straight line
        kick = acc * params.dt;
        p.vel += kick;
        acc = DVec2::ZERO;
    }

    let mut remaining = params.dt;
    let mut collisions = 0;
    loop {
        let path = Trajectory {
            pos: p.pos,
            vel: p.vel,
            acc,
        };
        let area = path.bounds(remaining).expand(params.eps);
        ctx.broadphase.candidates(&area, candidates);

        let contact = if params.linear {
            linear_hit(ctx.shapes, candidates, p.pos, p.vel, remaining)
        } else {
            parabolic_hit(ctx.shapes, candidates, &path, remaining, params.eps).map_err(|_| {
                NumericalError::SubdivisionDepth {
                    particle: p.id,
                    step: ctx.step,
                }
            })?
        };

        let Some(contact) = contact else {
            let end = path.at(remaining);
            frame.paths.push((p.pos, end));
            p.pos = end;
            p.vel = path.velocity_at(remaining);
            p.time += remaining;
            return Ok(());
        };

        collisions += 1;
        if collisions > MAX_COLLISIONS_PER_STEP {
            return Err(NumericalError::CollisionLimit {
                particle: p.id,
                step: ctx.step,
            });
        }

        let shape = &ctx.shapes[contact.shape];
        let mut vel_in = path.velocity_at(contact.t);
        if !params.equal_time {
            // the step ends at the contact: only the elapsed share of the kick applies
            vel_in -= kick * (1.0 - contact.t / params.dt);
        }
        let resolved = bounce(&contact, vel_in, shape.damping(), params.eps);
        frame.paths.push((p.pos, contact.point));
        p.pos = resolved.pos;
        p.vel = resolved.vel;
        p.time += contact.t;
        p.bounces += 1;
        remaining -= contact.t;
        frame.events.push(CollisionEvent {
            particle: p.id,
            shape: contact.shape,
            time: p.time,
            point: contact.point,
        });

        if params.verbose {
            info!(
                "particle {} hit {} '{}' at ({:.6}, {:.6}) t={:.6}",
                p.id,
                contact.shape,
                shape.label,
                contact.point.x,
                contact.point.y,
                p.time
            );
        }

        if params.accuracy && !is_consistent(&shape.current(), contact.from, p.pos, params.eps) {
            return Err(NumericalError::Inconsistent {
                particle: p.id,
                shape: contact.shape,
                step: ctx.step,
            });
        }

        if shape.absorb {
            p.alive = false;
            return Ok(());
        }
        if !params.equal_time || remaining <= 0.0 {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::forces::Gravity;
    use crate::sim::geometry::{Circle, Primitive, Rect, Segment};
    use crate::sim::mask::Mask;
    use crate::sim::shape::{Concentric, Geometry, Scaling};

    fn params(linear: bool, equal_time: bool, dt: f64) -> Params {
        Params {
            eps: 1e-6,
            dt,
            equal_time,
            accuracy: true,
            linear,
            verbose: false,
        }
    }

    fn world(params: Params, shapes: Vec<Shape>, particles: Vec<Particle>, forces: AccelSet) -> World {
        let n = shapes.len();
        World::new(params, shapes, particles, forces, Broadphase::All(n))
    }

    fn fixed(p: Primitive) -> Shape {
        Shape::new(Geometry::Static(p), 1.0, false, p.kind())
    }

    fn floor() -> Primitive {
        Primitive::Segment(Segment::new(DVec2::new(-10.0, 0.0), DVec2::new(10.0, 0.0)))
    }

    fn run(world: &mut World, steps: u64) -> Vec<StepFrame> {
        let mut frames = Vec::new();
        for _ in 0..steps {
            let mut frame = StepFrame::default();
            tick(world, &mut frame).unwrap();
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn test_elastic_circle_preserves_speed() {
        for linear in [true, false] {
            let unit = Primitive::Circle(Circle {
                center: DVec2::ZERO,
                radius: 1.0,
            });
            let v0 = DVec2::new(0.7, 0.3);
            let mut w = world(
                params(linear, true, 1e-2),
                vec![fixed(unit)],
                vec![Particle::new(0, DVec2::ZERO, v0)],
                AccelSet::new(),
            );
            run(&mut w, 1000);
            let p = &w.particles[0];
            assert!(p.bounces > 0);
            assert!((p.vel.length() - v0.length()).abs() < 1e-12);
            assert!(p.pos.length() < 1.0);
        }
    }

    #[test]
    fn test_open_gap_is_never_reflected() {
        for linear in [true, false] {
            let masked = Primitive::MaskedCircle(
                Circle {
                    center: DVec2::ZERO,
                    radius: 1.0,
                },
                Mask::NHoles {
                    n: 4,
                    gap: 0.5,
                    offset: 0.0,
                },
            );
            let mut w = world(
                params(linear, true, 1e-2),
                vec![fixed(masked)],
                vec![Particle::new(0, DVec2::ZERO, DVec2::X)],
                AccelSet::new(),
            );
            run(&mut w, 200);
            let p = &w.particles[0];
            assert_eq!(p.bounces, 0);
            assert!((p.pos.x - 2.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_floor_is_never_penetrated() {
        let mut w = world(
            params(false, false, 1e-2),
            vec![fixed(floor())],
            vec![Particle::new(0, DVec2::new(0.0, 0.5), DVec2::new(0.1, 0.0))],
            AccelSet::new().with(Gravity { g: -1.0 }),
        );
        for _ in 0..400 {
            let mut frame = StepFrame::default();
            tick(&mut w, &mut frame).unwrap();
            assert!(w.particles[0].pos.y > 0.0);
        }
        assert!(w.particles[0].bounces >= 1);
    }

    #[test]
    fn test_equal_time_consumes_full_step() {
        let unit_box = Primitive::Box(Rect::new(DVec2::ZERO, DVec2::ONE));
        let mut w = world(
            params(true, true, 0.1),
            vec![fixed(unit_box)],
            vec![Particle::new(0, DVec2::new(0.5, 0.5), DVec2::X)],
            AccelSet::new(),
        );
        run(&mut w, 10);
        let p = &w.particles[0];
        assert!(p.bounces >= 1);
        assert!((p.time - 1.0).abs() < 1e-12);
        assert!((w.time - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_event_driven_step_ends_at_collision() {
        let unit_box = Primitive::Box(Rect::new(DVec2::ZERO, DVec2::ONE));
        let mut w = world(
            params(true, false, 0.3),
            vec![fixed(unit_box)],
            vec![Particle::new(0, DVec2::new(0.5, 0.5), DVec2::X)],
            AccelSet::new(),
        );
        let frames = run(&mut w, 2);
        assert_eq!(frames[1].events.len(), 1);
        assert!((w.particles[0].time - 0.5).abs() < 1e-12);
        assert!((w.time - 0.5).abs() < 1e-12);
        assert_eq!(w.particles[0].vel, DVec2::new(-1.0, 0.0));
    }

    #[test]
    fn test_linear_kick_scales_with_elapsed_time() {
        // the kicked chord reaches the floor halfway through the step
        let mut w = world(
            params(true, false, 0.1),
            vec![fixed(floor())],
            vec![Particle::new(0, DVec2::new(0.0, 0.005), DVec2::ZERO)],
            AccelSet::new().with(Gravity { g: -1.0 }),
        );
        run(&mut w, 1);
        let p = &w.particles[0];
        assert_eq!(p.bounces, 1);
        assert!((p.time - 0.05).abs() < 1e-12);
        assert!((p.vel.y - 0.05).abs() < 1e-12);
        assert_eq!(p.vel.x, 0.0);
    }

    #[test]
    fn test_absorbing_wall_removes_particle() {
        let mut sink = fixed(floor());
        sink.absorb = true;
        let mut w = world(
            params(true, false, 1e-2),
            vec![sink],
            vec![Particle::new(0, DVec2::new(0.0, 0.1), DVec2::new(0.0, -1.0))],
            AccelSet::new(),
        );
        run(&mut w, 20);
        assert_eq!(w.alive_count(), 0);
        assert_eq!(w.total_bounces(), 1);
    }

    #[test]
    fn test_damping_loses_energy() {
        let mut wall = fixed(floor());
        wall.damp = 0.5;
        let mut w = world(
            params(true, false, 1e-2),
            vec![wall],
            vec![Particle::new(0, DVec2::new(0.0, 0.1), DVec2::new(0.0, -1.0))],
            AccelSet::new(),
        );
        run(&mut w, 20);
        assert!((w.particles[0].vel.y - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_finite_state_is_fatal() {
        let mut w = world(
            params(true, false, 1.0),
            Vec::new(),
            vec![Particle::new(7, DVec2::ZERO, DVec2::ZERO)],
            AccelSet::new().with(Gravity { g: f64::MAX }),
        );
        let mut frame = StepFrame::default();
        let err = (0..4).find_map(|_| tick(&mut w, &mut frame).err());
        assert!(matches!(err, Some(NumericalError::NonFinite { particle: 7, .. })));
    }

    #[test]
    fn test_concentric_geometry_follows_step() {
        let base = Primitive::Circle(Circle {
            center: DVec2::ZERO,
            radius: 1.0,
        });
        let scaling = Scaling {
            min_scale: 1.0,
            max_scale: 2.0,
            steps: 4,
        };
        let shape = Shape::new(
            Geometry::Concentric(Concentric::new(base, scaling)),
            1.0,
            false,
            "concentric",
        );
        let mut w = world(params(true, false, 1e-3), vec![shape], Vec::new(), AccelSet::new());
        run(&mut w, 2);
        match w.shapes[0].current() {
            Primitive::Circle(c) => assert!((c.radius - 1.5).abs() < 1e-12),
            other => panic!("unexpected {}", other.kind()),
        }
        assert!((w.time - 2e-3).abs() < 1e-15);
    }

    #[test]
    fn test_growing_ring_pushes_resting_particle_out() {
        // radius 0.1 → 0.45 over 10 steps, passing the particle during step 6
        let base = Primitive::Circle(Circle {
            center: DVec2::ZERO,
            radius: 0.1,
        });
        let scaling = Scaling {
            min_scale: 1.0,
            max_scale: 4.5,
            steps: 10,
        };
        let shape = Shape::new(
            Geometry::Concentric(Concentric::new(base, scaling)),
            1.0,
            false,
            "ring",
        );
        let mut w = world(
            params(false, false, 1e-3),
            vec![shape],
            vec![Particle::new(0, DVec2::new(0.3, 0.0), DVec2::ZERO)],
            AccelSet::new(),
        );
        let frames = run(&mut w, 10);

        let radius = match w.shapes[0].current() {
            Primitive::Circle(c) => c.radius,
            other => panic!("unexpected {}", other.kind()),
        };
        assert!((radius - 0.45).abs() < 1e-12);
        let p = &w.particles[0];
        assert!(p.pos.length() > radius);
        assert!(p.pos.length() - radius <= 2e-6);
        assert_eq!(p.bounces, 5);
        let swept: Vec<u64> = frames
            .iter()
            .filter(|f| f.events.iter().any(|e| e.shape == 0))
            .map(|f| f.step)
            .collect();
        assert_eq!(swept, vec![6, 7, 8, 9, 10]);
    }

    #[test]
    fn test_shrinking_ring_keeps_inner_particle_inside() {
        let base = Primitive::Circle(Circle {
            center: DVec2::ZERO,
            radius: 1.0,
        });
        let scaling = Scaling {
            min_scale: 1.0,
            max_scale: 0.5,
            steps: 5,
        };
        let shape = Shape::new(
            Geometry::Concentric(Concentric::new(base, scaling)),
            0.5,
            false,
            "ring",
        );
        let mut w = world(
            params(true, false, 1e-3),
            vec![shape],
            vec![Particle::new(0, DVec2::new(0.0, 0.8), DVec2::new(0.0, 1.0))],
            AccelSet::new(),
        );
        run(&mut w, 5);
        // swept at steps 2 through 5, reflected once, damped every time
        let p = &w.particles[0];
        assert_eq!(p.bounces, 4);
        assert!(p.pos.length() < 0.5);
        assert!(p.vel.y < 0.0);
        assert!((p.vel.length() - 0.0625).abs() < 1e-12);
    }

    #[test]
    fn test_identical_worlds_stay_identical() {
        let make = || {
            world(
                params(false, false, 1e-2),
                vec![
                    fixed(floor()),
                    fixed(Primitive::Circle(Circle {
                        center: DVec2::new(0.3, 0.4),
                        radius: 0.2,
                    })),
                ],
                vec![Particle::new(0, DVec2::new(0.31, 1.0), DVec2::new(0.05, 0.0))],
                AccelSet::new().with(Gravity { g: -1.0 }),
            )
        };
        let (mut a, mut b) = (make(), make());
        let fa = run(&mut a, 300);
        let fb = run(&mut b, 300);
        assert_eq!(fa, fb);
        assert_eq!(a.particles, b.particles);
    }
}
