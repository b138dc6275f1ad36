use std::collections::BTreeMap;

use crate::constants::{BLOCK_SIZE, MAX_COORDINATE};
use crate::types::{Block, Bounds};

/// Block-grid coordinates of the block owning `(x, y)`.
///
/// Floors toward negative infinity, so `-1` belongs to block `-1`, not `0`.
pub fn block_coordinates_of(x: i64, y: i64) -> (i64, i64) {
    (x.div_euclid(BLOCK_SIZE), y.div_euclid(BLOCK_SIZE))
}

/// True when `(x, y)` lies inside the addressable grid.
pub fn in_coordinate_range(x: i64, y: i64) -> bool {
    let range = -MAX_COORDINATE..=MAX_COORDINATE;
    range.contains(&x) && range.contains(&y)
}

pub fn block_id(block_x: i64, block_y: i64) -> String {
    format!("{block_x}:{block_y}")
}

pub fn parse_block_id(raw: &str) -> Option<(i64, i64)> {
    let (x, y) = raw.split_once(':')?;
    Some((x.parse().ok()?, y.parse().ok()?))
}

pub fn bounds_of(block_x: i64, block_y: i64) -> Bounds {
    let left = block_x * BLOCK_SIZE;
    let top = block_y * BLOCK_SIZE;
    Bounds {
        top,
        right: left + BLOCK_SIZE,
        bottom: top + BLOCK_SIZE,
        left,
    }
}

pub fn empty_block_at(x: i64, y: i64) -> Block {
    let (block_x, block_y) = block_coordinates_of(x, y);
    Block {
        block_id: block_id(block_x, block_y),
        bit_in_range_by_id: BTreeMap::new(),
        bounds: bounds_of(block_x, block_y),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [i64; 13] = [
        i64::MIN / 64,
        -1_000_001,
        -65,
        -64,
        -33,
        -32,
        -31,
        -1,
        0,
        1,
        31,
        32,
        1_000_003,
    ];

    #[test]
    fn negative_coordinates_floor_toward_negative_infinity() {
        assert_eq!(block_coordinates_of(-1, -1), (-1, -1));
        assert_eq!(block_coordinates_of(-32, -33), (-1, -2));
        assert_eq!(block_coordinates_of(31, 32), (0, 1));
    }

    #[test]
    fn every_point_is_inside_its_owning_block() {
        for &x in &SAMPLES {
            for &y in &SAMPLES {
                let (bx, by) = block_coordinates_of(x, y);
                let bounds = bounds_of(bx, by);
                assert!(bounds.contains(x, y), "({x},{y}) not in {bounds:?}");
                assert_eq!(bounds.width(), BLOCK_SIZE);
                assert_eq!(bounds.height(), BLOCK_SIZE);

                for (nx, ny) in [(bx - 1, by), (bx + 1, by), (bx, by - 1), (bx, by + 1)] {
                    assert!(!bounds_of(nx, ny).contains(x, y));
                }
            }
        }
    }

    #[test]
    fn adjacent_blocks_tile_without_gaps() {
        for &b in &[-3_i64, -1, 0, 1, 7] {
            let here = bounds_of(b, b);
            assert_eq!(here.right, bounds_of(b + 1, b).left);
            assert_eq!(here.bottom, bounds_of(b, b + 1).top);
        }
    }

    #[test]
    fn coordinate_range_is_symmetric() {
        assert!(in_coordinate_range(MAX_COORDINATE, -MAX_COORDINATE));
        assert!(!in_coordinate_range(MAX_COORDINATE + 1, 0));
        assert!(!in_coordinate_range(0, i64::MIN));

        let (bx, by) = block_coordinates_of(MAX_COORDINATE, -MAX_COORDINATE);
        assert!(bounds_of(bx + 1, by - 1).right > MAX_COORDINATE);
    }

    #[test]
    fn block_id_round_trips() {
        for &x in &[-12_i64, -1, 0, 5, i64::MAX] {
            for &y in &[-7_i64, 0, 3, i64::MIN] {
                assert_eq!(parse_block_id(&block_id(x, y)), Some((x, y)));
            }
        }
        assert_ne!(block_id(1, 11), block_id(11, 1));
        assert_eq!(parse_block_id("1:"), None);
        assert_eq!(parse_block_id("nope"), None);
    }

    #[test]
    fn empty_block_matches_owner() {
        let block = empty_block_at(-5, 40);
        assert_eq!(block.block_id, "-1:1");
        assert!(block.bit_in_range_by_id.is_empty());
        assert_eq!(
            block.bounds,
            Bounds {
                top: 32,
                right: 0,
                bottom: 64,
                left: -32,
            }
        );
    }
}
