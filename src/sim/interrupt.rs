//! Halt conditions evaluated after every step

use std::fmt;

use super::shape::ShapeId;
use super::state::StepFrame;

#[derive(Debug, Clone, PartialEq)]
pub enum Interrupt {
    /// Fires when any particle hits one of the shapes registered under `target`
    Collision {
        target: String,
        /// Sorted
        shapes: Vec<ShapeId>,
    },
}

impl Interrupt {
    pub fn collision(target: impl Into<String>, mut shapes: Vec<ShapeId>) -> Self {
        shapes.sort_unstable();
        shapes.dedup();
        Interrupt::Collision {
            target: target.into(),
            shapes,
        }
    }

    pub fn fires(&self, frame: &StepFrame) -> bool {
        match self {
            Interrupt::Collision { shapes, .. } => frame
                .events
                .iter()
                .any(|e| shapes.binary_search(&e.shape).is_ok()),
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Collision { target, .. } => write!(f, "collision with '{target}'"),
        }
    }
}

/// The first interrupt, in declaration order, that fires for this step
pub fn first_firing<'a>(interrupts: &'a [Interrupt], frame: &StepFrame) -> Option<&'a Interrupt> {
    interrupts.iter().find(|i| i.fires(frame))
}
