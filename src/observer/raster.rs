//! Floating-point intensity accumulator with anti-aliased line drawing
//!
//! Row 0 of the buffer is the lowest `y` of the region; the graymap encoder
//! flips it so the top image row is the highest `y`.

use glam::DVec2;

use crate::config::Blend;
use crate::sim::geometry::Rect;

#[inline]
fn fpart(x: f64) -> f64 {
    x - x.floor()
}

#[inline]
fn rfpart(x: f64) -> f64 {
    1.0 - fpart(x)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    region: Rect,
    width: u32,
    height: u32,
    blend: Blend,
    data: Vec<f64>,
}

impl Raster {
    pub fn new(region: Rect, width: u32, height: u32, blend: Blend) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        Self {
            region,
            width,
            height,
            blend,
            data: vec![0.0; width as usize * height as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn region(&self) -> Rect {
        self.region
    }

    /// Samples, bottom row first
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Horizontal pixels per world unit
    pub fn pixels_per_unit(&self) -> f64 {
        f64::from(self.width) / self.region.width()
    }

    /// Change the resolution, discarding everything drawn so far
    pub fn resize(&mut self, width: u32, height: u32) {
        *self = Self::new(self.region, width, height, self.blend);
    }

    /// Continuous pixel coordinates, pixel `i` centred on `i`
    fn to_pixel(&self, p: DVec2) -> DVec2 {
        let size = DVec2::new(f64::from(self.width), f64::from(self.height));
        (p - self.region.ll) / (self.region.uu - self.region.ll) * size - 0.5
    }

    fn plot(&mut self, x: f64, y: f64, value: f64) {
        if !(x >= 0.0 && y >= 0.0 && x < f64::from(self.width) && y < f64::from(self.height)) {
            return;
        }
        let i = y as usize * self.width as usize + x as usize;
        match self.blend {
            Blend::Add => self.data[i] += value,
        }
    }

    /// Draw the world-space segment `a → b` with Xiaolin Wu's algorithm
    pub fn line(&mut self, a: DVec2, b: DVec2) {
        let (mut p0, mut p1) = (self.to_pixel(a), self.to_pixel(b));
        if !(p0.is_finite() && p1.is_finite()) {
            return;
        }
        let steep = (p1.y - p0.y).abs() > (p1.x - p0.x).abs();
        if steep {
            p0 = DVec2::new(p0.y, p0.x);
            p1 = DVec2::new(p1.y, p1.x);
        }
        if p0.x > p1.x {
            std::mem::swap(&mut p0, &mut p1);
        }
        let d = p1 - p0;
        let gradient = if d.x == 0.0 { 1.0 } else { d.y / d.x };
        let span = f64::from(if steep { self.height } else { self.width });

        let mut put = |x: f64, y: f64, v: f64| {
            if steep {
                self.plot(y, x, v);
            } else {
                self.plot(x, y, v);
            }
        };

        // first endpoint
        let xend = p0.x.round();
        let yend = p0.y + gradient * (xend - p0.x);
        let xgap = rfpart(p0.x + 0.5);
        let xpxl1 = xend;
        put(xpxl1, yend.floor(), rfpart(yend) * xgap);
        put(xpxl1, yend.floor() + 1.0, fpart(yend) * xgap);
        let mut intery = yend + gradient;

        // second endpoint
        let xend = p1.x.round();
        let yend = p1.y + gradient * (xend - p1.x);
        let xgap = fpart(p1.x + 0.5);
        let xpxl2 = xend;
        put(xpxl2, yend.floor(), rfpart(yend) * xgap);
        put(xpxl2, yend.floor() + 1.0, fpart(yend) * xgap);

        // interior, clipped to the raster
        let first = xpxl1 + 1.0;
        let last = (xpxl2 - 1.0).min(span);
        let mut x = first.max(0.0);
        if x > first {
            intery += gradient * (x - first);
        }
        while x <= last {
            put(x, intery.floor(), rfpart(intery));
            put(x, intery.floor() + 1.0, fpart(intery));
            intery += gradient;
            x += 1.0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(width: u32, height: u32) -> Raster {
        Raster::new(Rect::new(DVec2::ZERO, DVec2::ONE), width, height, Blend::Add)
    }

    #[test]
    fn test_horizontal_line_intensity_matches_length() {
        let mut r = unit(8, 8);
        r.line(DVec2::new(0.125, 0.5625), DVec2::new(0.875, 0.5625));
        let total: f64 = r.data().iter().sum();
        assert!((total - 6.0).abs() < 1e-12);
        // everything lands on row 4
        let row: f64 = r.data()[32..40].iter().sum();
        assert!((row - total).abs() < 1e-12);
    }

    #[test]
    fn test_steep_line_splits_between_columns() {
        let mut r = unit(8, 8);
        // halfway between the centers of columns 3 and 4
        r.line(DVec2::new(0.5, 0.125), DVec2::new(0.5, 0.875));
        let total: f64 = r.data().iter().sum();
        assert!((total - 6.0).abs() < 1e-12);
        let col3: f64 = (0..8).map(|y| r.data()[y * 8 + 3]).sum();
        let col4: f64 = (0..8).map(|y| r.data()[y * 8 + 4]).sum();
        assert!((col3 - col4).abs() < 1e-12);
    }

    #[test]
    fn test_lines_outside_region_are_dropped() {
        let mut r = unit(8, 8);
        r.line(DVec2::new(5.0, 5.0), DVec2::new(6.0, 6.0));
        r.line(DVec2::new(-1e300, 0.5), DVec2::new(-1e299, 0.5));
        assert!(r.data().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_long_line_is_clipped() {
        let mut r = unit(16, 16);
        r.line(DVec2::new(-1e6, 0.5), DVec2::new(1e6, 0.5));
        let total: f64 = r.data().iter().sum();
        assert!((total - 16.0).abs() < 1e-9);
    }

    #[test]
    fn test_resize_clears() {
        let mut r = unit(4, 4);
        r.line(DVec2::new(0.1, 0.5), DVec2::new(0.9, 0.5));
        r.resize(6, 3);
        assert_eq!(r.data().len(), 18);
        assert!(r.data().iter().all(|&v| v == 0.0));
    }
}
