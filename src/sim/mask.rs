//! Angular masks for punching holes into circular walls
//!
//! A mask answers one question: is the wall open at this angle? Angles are
//! measured around the owning circle's center, in radians.

use std::f64::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::config::MaskConfig;
use crate::error::LoadError;
use crate::normalize_angle;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Mask {
    /// `n` gaps of angular width `gap`, centred at `offset + k * 2π / n`
    NHoles { n: u32, gap: f64, offset: f64 },
}

impl Mask {
    pub fn from_config(cfg: &MaskConfig) -> Result<Self, LoadError> {
        match *cfg {
            MaskConfig::NHoles { n, gap, offset } => {
                if n <= 0 {
                    return Err(LoadError::out_of_range("mask.n", "must be at least 1"));
                }
                if !(gap.is_finite() && gap >= 0.0) {
                    return Err(LoadError::out_of_range("mask.gap", "must be a non-negative angle"));
                }
                if !offset.is_finite() {
                    return Err(LoadError::out_of_range("mask.offset", "must be finite"));
                }
                let n = u32::try_from(n)
                    .map_err(|_| LoadError::out_of_range("mask.n", "too many holes"))?;
                Ok(Mask::NHoles { n, gap, offset })
            }
        }
    }

    /// Whether the wall is open (transparent) at `theta`
    pub fn is_open(&self, theta: f64) -> bool {
        match *self {
            Mask::NHoles { n, gap, offset } => {
                let spacing = TAU / f64::from(n);
                let half = gap * 0.5;
                // nearest hole center, found from the angle relative to the first hole
                let rel = (theta - offset).rem_euclid(TAU);
                let k = (rel / spacing).round();
                let delta = normalize_angle(rel - k * spacing);
                delta.abs() <= half
            }
        }
    }

    /// Whether the wall is solid at `theta`
    #[inline]
    pub fn is_solid(&self, theta: f64) -> bool {
        !self.is_open(theta)
    }
}
