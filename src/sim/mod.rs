//! Deterministic simulation module
//!
//! All physics lives here. This module must be pure and deterministic:
//! - Fixed outer timestep only
//! - Seeded RNG only
//! - Stable iteration order (particles by id, shapes by index)
//! - No rendering or platform dependencies

pub mod collision;
pub mod forces;
pub mod geometry;
pub mod interrupt;
pub mod mask;
pub mod neighborlist;
pub mod particles;
pub mod scene;
pub mod shape;
pub mod state;
pub mod tick;

pub use forces::{AccelSet, Acceleration, Drag, Gravity};
pub use geometry::{Circle, Primitive, Rect, Segment, reflect};
pub use interrupt::Interrupt;
pub use mask::Mask;
pub use neighborlist::{Broadphase, CellList};
pub use particles::{Generator, Particle};
pub use scene::{BOUNDARY, NamedEntry, Registry, Scene};
pub use shape::{Concentric, Geometry, Scaling, Shape, ShapeId, expand_tri_lattice};
pub use state::{CollisionEvent, Params, StepFrame, World};
pub use tick::tick;
