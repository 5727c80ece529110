//! Uniform-grid neighbor list over the geometry
//!
//! The grid covers a box with `nx * ny` cells. Each cell keeps the indices of
//! the shapes whose surface comes within `buffer` of it, so a query only
//! touches the cells overlapped by a particle's swept path. Points outside
//! the box are clamped onto the border cells, and shapes reaching outside
//! the box are clamped the same way, so nothing is ever missed.

use glam::DVec2;

use super::geometry::Rect;
use super::shape::{Shape, ShapeId};

#[derive(Debug, Clone)]
pub struct CellList {
    region: Rect,
    nx: usize,
    ny: usize,
    buffer: f64,
    cell_size: DVec2,
    cells: Vec<Vec<ShapeId>>,
    /// Rebuild after every step because some geometry moves
    dynamic: bool,
}

impl CellList {
    pub fn new(region: Rect, nx: usize, ny: usize, buffer: f64, shapes: &[Shape]) -> Self {
        let nx = nx.max(1);
        let ny = ny.max(1);
        let size = DVec2::new(region.width(), region.height()).max(DVec2::splat(f64::MIN_POSITIVE));
        let mut list = Self {
            region,
            nx,
            ny,
            buffer,
            cell_size: size / DVec2::new(nx as f64, ny as f64),
            cells: vec![Vec::new(); nx * ny],
            dynamic: shapes.iter().any(Shape::is_dynamic),
        };
        list.build(shapes);
        list
    }

    pub fn dims(&self) -> (usize, usize) {
        (self.nx, self.ny)
    }

    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Rebuild if any indexed geometry can move
    pub fn refresh(&mut self, shapes: &[Shape]) {
        if self.dynamic {
            self.build(shapes);
        }
    }

    fn build(&mut self, shapes: &[Shape]) {
        for cell in &mut self.cells {
            cell.clear();
        }
        for (id, shape) in shapes.iter().enumerate() {
            let geometry = shape.current();
            let reach = geometry.bounds().expand(self.buffer);
            let (x0, y0) = self.cell_coords(reach.ll);
            let (x1, y1) = self.cell_coords(reach.uu);
            for cy in y0..=y1 {
                for cx in x0..=x1 {
                    let rect = self.cell_rect(cx, cy);
                    // border cells also stand in for everything beyond the box
                    let border = cx == 0 || cy == 0 || cx == self.nx - 1 || cy == self.ny - 1;
                    if border || geometry.touches(&rect, self.buffer) {
                        self.cells[cy * self.nx + cx].push(id);
                    }
                }
            }
        }
    }

    /// Convert a position to (clamped) cell coordinates
    #[inline]
    fn cell_coords(&self, p: DVec2) -> (usize, usize) {
        let rel = (p - self.region.ll) / self.cell_size;
        let cx = rel.x.floor().clamp(0.0, (self.nx - 1) as f64) as usize;
        let cy = rel.y.floor().clamp(0.0, (self.ny - 1) as f64) as usize;
        (cx, cy)
    }

    fn cell_rect(&self, cx: usize, cy: usize) -> Rect {
        let ll = self.region.ll + DVec2::new(cx as f64, cy as f64) * self.cell_size;
        Rect {
            ll,
            uu: ll + self.cell_size,
        }
    }

    /// Shapes near any point of `area`, sorted and deduplicated
    pub fn query(&self, area: &Rect, out: &mut Vec<ShapeId>) {
        out.clear();
        let (x0, y0) = self.cell_coords(area.ll);
        let (x1, y1) = self.cell_coords(area.uu);
        for cy in y0..=y1 {
            for cx in x0..=x1 {
                out.extend_from_slice(&self.cells[cy * self.nx + cx]);
            }
        }
        out.sort_unstable();
        out.dedup();
    }
}

/// Broad phase used by the integrator
#[derive(Debug, Clone)]
pub enum Broadphase {
    /// Every shape is a candidate for every particle
    All(usize),
    Cells(CellList),
}

impl Broadphase {
    pub fn refresh(&mut self, shapes: &[Shape]) {
        match self {
            Broadphase::All(n) => *n = shapes.len(),
            Broadphase::Cells(list) => list.refresh(shapes),
        }
    }

    pub fn candidates(&self, area: &Rect, out: &mut Vec<ShapeId>) {
        match self {
            Broadphase::All(n) => {
                out.clear();
                out.extend(0..*n);
            }
            Broadphase::Cells(list) => list.query(area, out),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Broadphase::All(_) => "none (all pairs)".to_string(),
            Broadphase::Cells(list) => {
                let (nx, ny) = list.dims();
                format!("cell {nx}x{ny}{}", if list.is_dynamic() { " (rebuilt every step)" } else { "" })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::geometry::{Circle, Primitive};
    use crate::sim::shape::{Concentric, Geometry, Scaling};

    fn circle(x: f64, y: f64, r: f64) -> Shape {
        Shape::new(
            Geometry::Static(Primitive::Circle(Circle {
                center: DVec2::new(x, y),
                radius: r,
            })),
            1.0,
            false,
            "circle",
        )
    }

    fn unit_box() -> Rect {
        Rect::new(DVec2::ZERO, DVec2::ONE)
    }

    #[test]
    fn test_container_circle_only_near_rim() {
        let shapes = vec![circle(0.5, 0.5, 0.5), circle(0.5, 0.5, 0.05)];
        let list = CellList::new(unit_box(), 10, 10, 0.01, &shapes);
        let mut out = Vec::new();
        // middle of the box: only the small peg
        list.query(&Rect::point(DVec2::new(0.52, 0.52)), &mut out);
        assert_eq!(out, vec![1]);
        // near the rim at the top: only the container
        list.query(&Rect::point(DVec2::new(0.5, 0.995)), &mut out);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_query_outside_box_is_clamped() {
        let shapes = vec![circle(0.95, 0.5, 0.04)];
        let list = CellList::new(unit_box(), 10, 10, 0.0, &shapes);
        let mut out = Vec::new();
        list.query(&Rect::point(DVec2::new(3.0, 0.5)), &mut out);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_query_deduplicates_and_sorts() {
        let shapes = vec![circle(0.2, 0.2, 0.15), circle(0.25, 0.25, 0.15)];
        let list = CellList::new(unit_box(), 8, 8, 0.05, &shapes);
        let mut out = Vec::new();
        list.query(&Rect::new(DVec2::ZERO, DVec2::new(0.5, 0.5)), &mut out);
        assert_eq!(out, vec![0, 1]);
    }

    #[test]
    fn test_dynamic_geometry_rebuilds() {
        let scaling = Scaling {
            min_scale: 1.0,
            max_scale: 8.0,
            steps: 10,
        };
        let mut shapes = vec![Shape::new(
            Geometry::Concentric(Concentric::new(
                Primitive::Circle(Circle {
                    center: DVec2::new(0.5, 0.5),
                    radius: 0.05,
                }),
                scaling,
            )),
            1.0,
            false,
            "concentric",
        )];
        let mut list = CellList::new(unit_box(), 20, 20, 0.0, &shapes);
        assert!(list.is_dynamic());
        let probe = Rect::point(DVec2::new(0.5, 0.88));
        let mut out = Vec::new();
        list.query(&probe, &mut out);
        assert!(out.is_empty());
        shapes[0].set_step(10);
        list.refresh(&shapes);
        list.query(&probe, &mut out);
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_all_broadphase_lists_everything() {
        let shapes = vec![circle(0.0, 0.0, 1.0), circle(5.0, 5.0, 1.0)];
        let mut bp = Broadphase::All(0);
        bp.refresh(&shapes);
        let mut out = Vec::new();
        bp.candidates(&Rect::point(DVec2::ZERO), &mut out);
        assert_eq!(out, vec![0, 1]);
    }
}
