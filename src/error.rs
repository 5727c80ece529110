//! Error types for loading and running a simulation.

use std::io;
use thiserror::Error;

/// Errors raised while turning a JSON document into a [`crate::Simulation`].
///
/// Any of these aborts construction; no partial simulation is returned.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The document is not valid JSON or does not match the schema
    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// A `ref` names something that was never declared
    #[error("unresolved reference '{0}'")]
    UnresolvedRef(String),

    /// A `ref` names something declared later in the document
    #[error("forward reference '{name}' in {context}")]
    ForwardRef { name: String, context: String },

    /// Two declarations claim the same name
    #[error("duplicate object name '{0}'")]
    DuplicateName(String),

    /// A parameter is outside the range the engine accepts
    #[error("invalid value for {field}: {reason}")]
    OutOfRange { field: String, reason: String },

    /// A declaration combines variants the engine does not support
    #[error("unsupported configuration: {0}")]
    Unsupported(String),
}

impl LoadError {
    pub(crate) fn out_of_range(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::OutOfRange {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Fatal conditions detected while stepping.
///
/// These halt the run; observers are still flushed with what they gathered.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum NumericalError {
    /// Position or velocity stopped being finite
    #[error("particle {particle} has non-finite state at step {step}")]
    NonFinite { particle: u64, step: u64 },

    /// Sub-step bisection went deeper than allowed
    #[error("particle {particle} exceeded the bisection depth limit at step {step}")]
    SubdivisionDepth { particle: u64, step: u64 },

    /// Too many collisions inside one outer step
    #[error("particle {particle} exceeded the collision limit at step {step}")]
    CollisionLimit { particle: u64, step: u64 },

    /// A resolved collision left the particle off the surface or on the wrong side
    #[error("particle {particle} resolved inconsistently against object {shape} at step {step}")]
    Inconsistent {
        particle: u64,
        shape: usize,
        step: u64,
    },
}

/// Crate-level error used by hosts
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Numerical(#[from] NumericalError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
