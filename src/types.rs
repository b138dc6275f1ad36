use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub type BitId = String;

/// A player-controlled point on the grid.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bit {
    pub id: BitId,
    pub x: i64,
    pub y: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// Half-open rectangle in grid units: `left <= x < right`, `top <= y < bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub left: i64,
}

impl Bounds {
    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.left <= x && x < self.right && self.top <= y && y < self.bottom
    }

    pub fn width(&self) -> i64 {
        self.right - self.left
    }

    pub fn height(&self) -> i64 {
        self.bottom - self.top
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "blockId")]
    pub block_id: String,
    #[serde(rename = "bitInRangeById")]
    pub bit_in_range_by_id: BTreeMap<BitId, Bit>,
    pub bounds: Bounds,
}

/// The 3x3 blocks around a reference point, keyed by block id.
pub type Neighborhood = BTreeMap<String, Block>;

/// Union of every bit contained in a neighborhood's blocks.
pub fn bits_in_neighborhood(neighborhood: &Neighborhood) -> BTreeMap<BitId, Bit> {
    neighborhood
        .values()
        .flat_map(|block| block.bit_in_range_by_id.iter())
        .map(|(id, bit)| (id.clone(), bit.clone()))
        .collect()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    /// Keyboard key names as reported by the browser.
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "ArrowUp" | "w" => Some(Self::Up),
            "ArrowDown" | "s" => Some(Self::Down),
            "ArrowLeft" | "a" => Some(Self::Left),
            "ArrowRight" | "d" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn delta(self) -> (i64, i64) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    /// Neighboring point, saturating at the edges of `i64`.
    pub fn offset(self, x: i64, y: i64) -> (i64, i64) {
        let (dx, dy) = self.delta();
        (x.saturating_add(dx), y.saturating_add(dy))
    }
}
