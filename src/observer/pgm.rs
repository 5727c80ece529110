//! Portable graymap output
//!
//! Accumulated intensities are mapped to 8-bit gray levels and written as
//! `P5` (binary) or `P2` (ASCII) with a maximum value of 255.

use std::io::{self, Write};

use super::raster::Raster;
use crate::config::{Norm, PgmFormat};
use crate::consts::PGM_MAX_VALUE;

/// A finished graymap, top row first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pgm {
    pub width: u32,
    pub height: u32,
    pub format: PgmFormat,
    pub pixels: Vec<u8>,
}

impl Pgm {
    pub fn from_raster(raster: &Raster, norm: Norm, format: PgmFormat) -> Self {
        let width = raster.width() as usize;
        let levels = normalize(raster.data(), norm);
        // bottom-up accumulator rows become top-down image rows
        let pixels = levels
            .chunks_exact(width)
            .rev()
            .flatten()
            .copied()
            .collect();
        Self {
            width: raster.width(),
            height: raster.height(),
            format,
            pixels,
        }
    }

    /// Serialize header and samples
    pub fn write_to<W: Write>(&self, mut out: W) -> io::Result<()> {
        match self.format {
            PgmFormat::Binary => {
                write!(out, "P5\n{} {}\n{}\n", self.width, self.height, PGM_MAX_VALUE)?;
                out.write_all(&self.pixels)?;
            }
            PgmFormat::Ascii => {
                write!(out, "P2\n{} {}\n{}\n", self.width, self.height, PGM_MAX_VALUE)?;
                for row in self.pixels.chunks(self.width.max(1) as usize) {
                    // keep lines under 70 characters
                    let mut line = String::new();
                    for v in row {
                        let sample = v.to_string();
                        if !line.is_empty() && line.len() + 1 + sample.len() > 70 {
                            writeln!(out, "{line}")?;
                            line.clear();
                        }
                        if !line.is_empty() {
                            line.push(' ');
                        }
                        line.push_str(&sample);
                    }
                    writeln!(out, "{line}")?;
                }
            }
        }
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.pixels.len() + 32);
        // writing into a Vec cannot fail
        let _ = self.write_to(&mut bytes);
        bytes
    }
}

/// Map raw intensities to gray levels
pub fn normalize(data: &[f64], norm: Norm) -> Vec<u8> {
    let max_value = f64::from(PGM_MAX_VALUE);
    match norm {
        Norm::Linear => {
            let (lo, hi) = data
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let range = hi - lo;
            if !(range.is_finite() && range > 0.0) {
                return vec![0; data.len()];
            }
            data.iter()
                .map(|&v| ((v - lo) / range * max_value).round() as u8)
                .collect()
        }
        Norm::EqHist => {
            // rank among the distinct values present
            let mut levels: Vec<f64> = data.to_vec();
            levels.sort_by(f64::total_cmp);
            levels.dedup();
            if levels.len() < 2 {
                return vec![0; data.len()];
            }
            let top = (levels.len() - 1) as f64;
            data.iter()
                .map(|v| {
                    let rank = levels.partition_point(|x| x.total_cmp(v).is_lt());
                    (rank as f64 / top * max_value).round() as u8
                })
                .collect()
        }
    }
}
