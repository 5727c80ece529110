//! Scene loading: turns a parsed [`Config`] into a ready-to-run world
//!
//! Objects are built in declaration order. Every name they claim (explicitly
//! or implicitly, like the walls of a `tri-lattice`) goes into the
//! [`Registry`], which later sections resolve `ref`s against. A ref may only
//! point backwards: the loader knows every name the document will declare,
//! so a ref to one that is not registered yet is reported as a forward
//! reference rather than an unknown name.

use std::collections::{HashMap, HashSet};

use glam::DVec2;
use log::{debug, warn};

use super::forces::AccelSet;
use super::geometry::{Circle, Primitive, Rect, Segment};
use super::interrupt::Interrupt;
use super::mask::Mask;
use super::neighborlist::{Broadphase, CellList};
use super::particles::{Generator, particle_count};
use super::shape::{Concentric, Geometry, Scaling, Shape, ShapeId, expand_tri_lattice};
use super::state::{Params, World};
use crate::config::{
    Config, InterruptConfig, NeighborListConfig, ObjectConfig, ParticleConfig, RegionConfig,
    ScalingConfig,
};
use crate::error::LoadError;

/// Name claimed implicitly by the union of all geometry
pub const BOUNDARY: &str = "boundary";

/// Names emitted by every `tri-lattice`
const LATTICE_WALLS: [&str; 3] = ["left", "bottom", "right"];

/// One registered name
#[derive(Debug, Clone, PartialEq)]
pub struct NamedEntry {
    pub name: String,
    pub shapes: Vec<ShapeId>,
    pub bounds: Rect,
    pub implicit: bool,
}

/// Name → shapes lookup filled while objects load
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<NamedEntry>,
    index: HashMap<String, usize>,
    /// Names the document declares that are not registered yet
    pending: HashSet<String>,
}

impl Registry {
    fn expecting(pending: HashSet<String>) -> Self {
        Self {
            pending,
            ..Self::default()
        }
    }

    /// Claim `name` for `shapes`. Explicit names must be unique; implicit
    /// names accumulate.
    fn declare(
        &mut self,
        name: &str,
        shapes: &[ShapeId],
        bounds: Rect,
        implicit: bool,
    ) -> Result<(), LoadError> {
        self.pending.remove(name);
        if let Some(&i) = self.index.get(name) {
            let entry = &mut self.entries[i];
            if !implicit || !entry.implicit {
                return Err(LoadError::DuplicateName(name.to_string()));
            }
            entry.shapes.extend_from_slice(shapes);
            entry.bounds = entry.bounds.union(&bounds);
            return Ok(());
        }
        self.index.insert(name.to_string(), self.entries.len());
        self.entries.push(NamedEntry {
            name: name.to_string(),
            shapes: shapes.to_vec(),
            bounds,
            implicit,
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&NamedEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Resolve a `ref`, telling forward references apart from unknown names
    pub fn lookup(&self, name: &str, context: &str) -> Result<&NamedEntry, LoadError> {
        match self.get(name) {
            Some(entry) => Ok(entry),
            None if self.pending.contains(name) => Err(LoadError::ForwardRef {
                name: name.to_string(),
                context: context.to_string(),
            }),
            None => Err(LoadError::UnresolvedRef(name.to_string())),
        }
    }

    /// Resolve a box literal or the bounds of a named object
    pub fn region(&self, cfg: &RegionConfig, context: &str) -> Result<Rect, LoadError> {
        match cfg {
            RegionConfig::Box { ll, uu } => Ok(Rect::new(vec2(*ll), vec2(*uu))),
            RegionConfig::Ref { name } => Ok(self.lookup(name, context)?.bounds),
        }
    }

    /// Entries in registration order
    pub fn entries(&self) -> impl Iterator<Item = &NamedEntry> {
        self.entries.iter()
    }
}

/// Everything the engine needs from a configuration document
#[derive(Debug)]
pub struct Scene {
    pub world: World,
    pub registry: Registry,
    pub interrupts: Vec<Interrupt>,
    pub max_steps: u64,
    pub record_objects: bool,
}

impl Scene {
    pub fn load(config: &Config) -> Result<Self, LoadError> {
        config.simulation.validate()?;

        let mut loader = Loader {
            shapes: Vec::new(),
            registry: Registry::expecting(declared_names(&config.objects)),
        };
        for (i, object) in config.objects.iter().enumerate() {
            loader.object(object, &format!("objects[{i}]"))?;
        }
        loader.declare_boundary()?;
        let Loader { shapes, registry } = loader;

        let mut particles = Vec::new();
        let mut next_id = 0;
        for (i, cfg) in config.particles.iter().enumerate() {
            let generator = generator(cfg, &registry, &format!("particles[{i}]"))?;
            generator.generate(&mut next_id, &mut particles);
        }
        if particles.is_empty() {
            warn!("scene has no particles");
        }

        let broadphase = match &config.neighborlist {
            Some(cfg) => Broadphase::Cells(cell_list(cfg, &registry, &shapes)?),
            None => Broadphase::All(shapes.len()),
        };

        let interrupts = config
            .interrupts
            .iter()
            .enumerate()
            .map(|(i, cfg)| match cfg {
                InterruptConfig::Collision { object } => {
                    let entry = registry.lookup(object.name(), &format!("interrupts[{i}]"))?;
                    Ok(Interrupt::collision(object.name(), entry.shapes.clone()))
                }
            })
            .collect::<Result<Vec<_>, LoadError>>()?;

        debug!(
            "scene loaded: {} shapes, {} names, {} particles",
            shapes.len(),
            registry.entries.len(),
            particles.len()
        );

        let world = World::new(
            Params::from(&config.simulation),
            shapes,
            particles,
            AccelSet::from_config(&config.forces),
            broadphase,
        );
        Ok(Self {
            world,
            registry,
            interrupts,
            max_steps: config.simulation.max_steps,
            record_objects: config.simulation.record_objects,
        })
    }
}

#[inline]
fn vec2(v: [f64; 2]) -> DVec2 {
    DVec2::new(v[0], v[1])
}

/// Every name the object list will register, explicit or implicit
fn declared_names(objects: &[ObjectConfig]) -> HashSet<String> {
    fn visit(object: &ObjectConfig, names: &mut HashSet<String>) {
        if let Some(name) = object.name() {
            names.insert(name.to_string());
        }
        match object {
            ObjectConfig::TriLattice(l) => {
                names.extend(LATTICE_WALLS.iter().map(|w| w.to_string()));
                visit(&l.object, names);
            }
            ObjectConfig::Concentric(c) => visit(&c.object, names),
            _ => {}
        }
    }
    let mut names = HashSet::new();
    names.insert(BOUNDARY.to_string());
    for object in objects {
        visit(object, &mut names);
    }
    names
}

/// Surface properties of a declaration
#[derive(Debug, Clone, Copy)]
struct Surface {
    damp: f64,
    absorb: bool,
}

struct Loader {
    shapes: Vec<Shape>,
    registry: Registry,
}

impl Loader {
    fn push(&mut self, geometry: Geometry, surface: Surface, label: &str) -> ShapeId {
        self.shapes
            .push(Shape::new(geometry, surface.damp, surface.absorb, label));
        self.shapes.len() - 1
    }

    fn bounds_of(&self, ids: &[ShapeId]) -> Option<Rect> {
        ids.iter()
            .map(|&id| self.shapes[id].max_bounds())
            .reduce(|a, b| a.union(&b))
    }

    fn name(&mut self, name: &str, ids: &[ShapeId], implicit: bool) -> Result<(), LoadError> {
        let bounds = self
            .bounds_of(ids)
            .ok_or_else(|| LoadError::Unsupported(format!("name '{name}' covers no geometry")))?;
        self.registry.declare(name, ids, bounds, implicit)
    }

    /// Build one top-level declaration, returning the shapes it produced
    fn object(&mut self, cfg: &ObjectConfig, context: &str) -> Result<Vec<ShapeId>, LoadError> {
        let ids = match cfg {
            ObjectConfig::TriLattice(l) => {
                let rows = positive(l.rows, "tri-lattice.rows")?;
                let columns = positive(l.columns, "tri-lattice.columns")?;
                let (template, surface) = self.template(&l.object, context)?;
                if !matches!(
                    template,
                    Primitive::Circle(_) | Primitive::MaskedCircle(..) | Primitive::Box(_)
                ) {
                    return Err(LoadError::Unsupported(format!(
                        "tri-lattice template must be circle, masked_circle or box, not {}",
                        template.kind()
                    )));
                }
                let lattice = expand_tri_lattice(template, rows, columns);
                let label = l.object.name().unwrap_or("tri-lattice").to_string();
                let instances: Vec<ShapeId> = lattice
                    .instances
                    .into_iter()
                    .map(|p| self.push(Geometry::Static(p), surface, &label))
                    .collect();
                if let Some(name) = l.object.name() {
                    self.name(name, &instances, false)?;
                }
                let mut ids = instances;
                let wall_surface = Surface {
                    damp: surface.damp,
                    absorb: false,
                };
                for (wall, segment) in lattice.walls {
                    let id = self.push(Geometry::Static(Primitive::Segment(segment)), wall_surface, wall);
                    self.name(wall, &[id], true)?;
                    ids.push(id);
                }
                ids
            }
            ObjectConfig::Concentric(c) => {
                let scaling = scaling(&c.scaling_function)?;
                if matches!(c.object.as_ref(), ObjectConfig::Concentric(_)) {
                    return Err(LoadError::Unsupported("nested concentric objects".into()));
                }
                let (base, surface) = self.template(&c.object, context)?;
                let label = c.name.as_deref().unwrap_or("concentric").to_string();
                let id = self.push(Geometry::Concentric(Concentric::new(base, scaling)), surface, &label);
                if let Some(name) = c.object.name() {
                    self.name(name, &[id], false)?;
                }
                vec![id]
            }
            ObjectConfig::Ref { name } => {
                let copies: Vec<Shape> = self
                    .registry
                    .lookup(name, context)?
                    .shapes
                    .iter()
                    .map(|&id| self.shapes[id].clone())
                    .collect();
                copies
                    .into_iter()
                    .map(|shape| {
                        self.shapes.push(shape);
                        self.shapes.len() - 1
                    })
                    .collect()
            }
            leaf => {
                let (primitive, surface) = leaf_primitive(leaf)?;
                let label = leaf.name().unwrap_or(leaf.kind()).to_string();
                vec![self.push(Geometry::Static(primitive), surface, &label)]
            }
        };
        if let Some(name) = cfg.name() {
            self.name(name, &ids, false)?;
        }
        Ok(ids)
    }

    /// A single static primitive used as a lattice template or concentric base
    fn template(&self, cfg: &ObjectConfig, context: &str) -> Result<(Primitive, Surface), LoadError> {
        match cfg {
            ObjectConfig::Ref { name } => {
                let entry = self.registry.lookup(name, context)?;
                let [id] = entry.shapes.as_slice() else {
                    return Err(LoadError::Unsupported(format!(
                        "'{name}' names {} objects, expected exactly one",
                        entry.shapes.len()
                    )));
                };
                let shape = &self.shapes[*id];
                match &shape.geometry {
                    Geometry::Static(p) => Ok((
                        *p,
                        Surface {
                            damp: shape.damp,
                            absorb: shape.absorb,
                        },
                    )),
                    Geometry::Concentric(_) => Err(LoadError::Unsupported(format!(
                        "'{name}' is a concentric object and cannot be wrapped again"
                    ))),
                }
            }
            ObjectConfig::TriLattice(_) | ObjectConfig::Concentric(_) => Err(LoadError::Unsupported(
                format!("{} cannot be used as a template", cfg.kind()),
            )),
            leaf => leaf_primitive(leaf),
        }
    }

    /// Register the union of all geometry as `boundary` unless it was claimed
    fn declare_boundary(&mut self) -> Result<(), LoadError> {
        if self.registry.get(BOUNDARY).is_some() {
            return Ok(());
        }
        let all: Vec<ShapeId> = (0..self.shapes.len()).collect();
        match self.bounds_of(&all) {
            Some(bounds) => self.registry.declare(BOUNDARY, &all, bounds, true),
            None => {
                self.registry.pending.remove(BOUNDARY);
                Ok(())
            }
        }
    }
}

fn positive(value: i64, field: &str) -> Result<u32, LoadError> {
    if value <= 0 {
        return Err(LoadError::out_of_range(field, "must be positive"));
    }
    u32::try_from(value).map_err(|_| LoadError::out_of_range(field, "too large"))
}

fn finite(value: f64, field: &str) -> Result<f64, LoadError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(LoadError::out_of_range(field, "must be finite"))
    }
}

fn radius(value: f64, field: &str) -> Result<f64, LoadError> {
    if finite(value, field)? < 0.0 {
        return Err(LoadError::out_of_range(field, "must not be negative"));
    }
    Ok(value)
}

fn leaf_primitive(cfg: &ObjectConfig) -> Result<(Primitive, Surface), LoadError> {
    let surface = |damp: f64, absorb: bool| -> Result<Surface, LoadError> {
        Ok(Surface {
            damp: finite(damp, "damp")?,
            absorb,
        })
    };
    match cfg {
        ObjectConfig::Circle(c) => Ok((
            Primitive::Circle(Circle {
                center: vec2(c.pos),
                radius: radius(c.rad, "circle.rad")?,
            }),
            surface(c.damp, c.absorb)?,
        )),
        ObjectConfig::MaskedCircle(c) => Ok((
            Primitive::MaskedCircle(
                Circle {
                    center: vec2(c.pos),
                    radius: radius(c.rad, "masked_circle.rad")?,
                },
                Mask::from_config(&c.mask)?,
            ),
            surface(c.damp, c.absorb)?,
        )),
        ObjectConfig::Box(b) => Ok((
            Primitive::Box(Rect::new(vec2(b.ll), vec2(b.uu))),
            surface(b.damp, b.absorb)?,
        )),
        ObjectConfig::Segment(s) => {
            if s.p0 == s.p1 {
                return Err(LoadError::out_of_range("segment", "endpoints must differ"));
            }
            Ok((
                Primitive::Segment(Segment::new(vec2(s.p0), vec2(s.p1))),
                surface(s.damp, s.absorb)?,
            ))
        }
        other => Err(LoadError::Unsupported(format!(
            "{} is not a primitive shape",
            other.kind()
        ))),
    }
}

fn scaling(cfg: &ScalingConfig) -> Result<Scaling, LoadError> {
    match *cfg {
        ScalingConfig::Linear {
            min_scale,
            max_scale,
            steps,
        } => {
            radius(min_scale, "scaling_function.min_scale")?;
            radius(max_scale, "scaling_function.max_scale")?;
            if steps <= 0 {
                return Err(LoadError::out_of_range("scaling_function.steps", "must be positive"));
            }
            Ok(Scaling {
                min_scale,
                max_scale,
                steps: steps as u64,
            })
        }
    }
}

fn generator(cfg: &ParticleConfig, registry: &Registry, context: &str) -> Result<Generator, LoadError> {
    Ok(match *cfg {
        ParticleConfig::Single { pos, vel } => Generator::Single {
            pos: vec2(pos),
            vel: vec2(vel),
        },
        ParticleConfig::Uniform { p0, p1, v0, v1, n } => Generator::Uniform {
            p0: vec2(p0),
            p1: vec2(p1),
            v0: vec2(v0),
            v1: vec2(v1),
            n: particle_count(n)?,
        },
        ParticleConfig::Random {
            ref region,
            v0,
            v1,
            n,
            seed,
        } => Generator::Random {
            region: registry.region(region, context)?,
            v0: vec2(v0),
            v1: vec2(v1),
            n: particle_count(n)?,
            seed,
        },
    })
}

fn cell_list(cfg: &NeighborListConfig, registry: &Registry, shapes: &[Shape]) -> Result<CellList, LoadError> {
    match cfg {
        NeighborListConfig::Cell {
            ncells,
            buffer,
            region,
        } => {
            let nx = positive(ncells[0], "neighborlist.ncells")?;
            let ny = positive(ncells[1], "neighborlist.ncells")?;
            if radius(*buffer, "neighborlist.buffer")? == 0.0 {
                debug!("neighbor list without buffer");
            }
            let region = registry.region(region, "neighborlist")?;
            if region.width() <= 0.0 || region.height() <= 0.0 {
                return Err(LoadError::out_of_range("neighborlist.box", "must have positive area"));
            }
            Ok(CellList::new(region, nx as usize, ny as usize, *buffer, shapes))
        }
    }
}
