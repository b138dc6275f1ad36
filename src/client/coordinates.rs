//! Conversions between canvas pixels and grid units.
//!
//! The origin grid point is drawn at the canvas center; one grid unit spans
//! `GRID_UNIT_PX` pixels.

use serde::Serialize;

use crate::constants::GRID_UNIT_PX;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Canvas {
    pub width: f64,
    pub height: f64,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn center(&self) -> (f64, f64) {
        (self.width / 2.0, self.height / 2.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GridPoint {
    pub x: i64,
    pub y: i64,
}

impl GridPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }
}

/// Grid window currently visible on the canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct ViewBounds {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
    pub origin: GridPoint,
}

impl ViewBounds {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.left <= x && x <= self.right && self.top <= y && y <= self.bottom
    }
}

pub fn canvas_to_bit(
    canvas_x: f64,
    canvas_y: f64,
    canvas: &Canvas,
    origin: GridPoint,
) -> GridPoint {
    let (center_x, center_y) = canvas.center();
    let unit = GRID_UNIT_PX as f64;
    GridPoint {
        x: round_half_up((canvas_x - center_x) / unit) + origin.x,
        y: round_half_up((canvas_y - center_y) / unit) + origin.y,
    }
}

pub fn bit_to_canvas(bit_x: i64, bit_y: i64, canvas: &Canvas, origin: GridPoint) -> (f64, f64) {
    let (center_x, center_y) = canvas.center();
    let unit = GRID_UNIT_PX as f64;
    (
        center_x + (bit_x - origin.x) as f64 * unit,
        center_y + (bit_y - origin.y) as f64 * unit,
    )
}

pub fn visible_bounds(canvas: &Canvas, origin: GridPoint) -> ViewBounds {
    let rows = (canvas.height / GRID_UNIT_PX as f64).floor() as i64;
    let cols = (canvas.width / GRID_UNIT_PX as f64).floor() as i64;
    ViewBounds {
        top: (-rows).div_euclid(2) + origin.y,
        right: cols.div_euclid(2) + origin.x,
        bottom: rows.div_euclid(2) + origin.y,
        left: (-cols).div_euclid(2) + origin.x,
        origin,
    }
}

// Halves round toward positive infinity.
fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}
