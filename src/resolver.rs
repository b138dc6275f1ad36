use std::collections::BTreeMap;

use crate::constants::{BLOCK_SIZE, NEIGHBORHOOD_RADIUS};
use crate::error::StoreError;
use crate::grid::{empty_block_at, in_coordinate_range};
use crate::store::EntityStore;
use crate::types::{Bit, BitId, Bounds, Neighborhood};

pub fn entities_in_bounds(
    store: &dyn EntityStore,
    bounds: &Bounds,
) -> Result<BTreeMap<BitId, Bit>, StoreError> {
    store.query_range(bounds)
}

/// Resolves the block containing `(x, y)` and its eight neighbors.
///
/// Either every block resolves or the first store error is returned.
/// `(x, y)` must satisfy [`in_coordinate_range`].
pub fn neighborhood_of(
    store: &dyn EntityStore,
    x: i64,
    y: i64,
) -> Result<Neighborhood, StoreError> {
    debug_assert!(in_coordinate_range(x, y));
    let center = empty_block_at(x, y);
    let Bounds { top, left, .. } = center.bounds;

    let mut blocks = Neighborhood::new();
    for step_x in -NEIGHBORHOOD_RADIUS..=NEIGHBORHOOD_RADIUS {
        for step_y in -NEIGHBORHOOD_RADIUS..=NEIGHBORHOOD_RADIUS {
            let mut block =
                empty_block_at(left + step_x * BLOCK_SIZE, top + step_y * BLOCK_SIZE);
            block.bit_in_range_by_id = entities_in_bounds(store, &block.bounds)?;
            blocks.insert(block.block_id.clone(), block);
        }
    }
    Ok(blocks)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::constants::MAX_COORDINATE;
    use crate::grid::{block_coordinates_of, block_id};
    use crate::store::MemoryBitStore;
    use crate::types::bits_in_neighborhood;

    /// Store whose reads always fail.
    pub(crate) struct UnavailableStore;

    impl EntityStore for UnavailableStore {
        fn create(&self, _x: Option<i64>, _y: Option<i64>) -> Result<Bit, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn get(&self, _id: &str) -> Result<Bit, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn update(&self, _id: &str, _x: i64, _y: i64) -> Result<Bit, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn delete(&self, _id: &str) -> Result<Bit, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
        fn query_range(&self, _bounds: &Bounds) -> Result<BTreeMap<BitId, Bit>, StoreError> {
            Err(StoreError::Unavailable("offline".to_string()))
        }
    }

    #[test]
    fn neighborhood_always_has_nine_distinct_blocks() {
        let store = MemoryBitStore::new();
        let edge = MAX_COORDINATE;
        for (x, y) in [(0, 0), (-1, -1), (-33, 70), (31, -32), (-edge, edge)] {
            let neighborhood = neighborhood_of(&store, x, y).expect("resolve");
            assert_eq!(neighborhood.len(), 9, "at ({x},{y})");

            let (bx, by) = block_coordinates_of(x, y);
            for dx in -1..=1 {
                for dy in -1..=1 {
                    assert!(neighborhood.contains_key(&block_id(bx + dx, by + dy)));
                }
            }
        }
    }

    #[test]
    fn bits_land_in_exactly_one_block() {
        let store = MemoryBitStore::new();
        let on_edge = store.create(Some(32), Some(0)).expect("create");
        let west = store.create(Some(-1), Some(5)).expect("create");
        let far = store.create(Some(200), Some(200)).expect("create");

        let neighborhood = neighborhood_of(&store, 10, 10).expect("resolve");
        let owners: Vec<&String> = neighborhood
            .values()
            .filter(|block| block.bit_in_range_by_id.contains_key(&on_edge.id))
            .map(|block| &block.block_id)
            .collect();
        assert_eq!(owners, vec!["1:0"]);

        assert!(neighborhood["-1:0"].bit_in_range_by_id.contains_key(&west.id));

        let all = bits_in_neighborhood(&neighborhood);
        assert_eq!(all.len(), 2);
        assert!(!all.contains_key(&far.id));
    }

    #[test]
    fn empty_area_resolves_to_empty_blocks() {
        let store = MemoryBitStore::new();
        let neighborhood = neighborhood_of(&store, 5_000, -5_000).expect("resolve");
        assert!(neighborhood
            .values()
            .all(|block| block.bit_in_range_by_id.is_empty()));
    }

    #[test]
    fn store_failure_fails_the_whole_neighborhood() {
        let result = neighborhood_of(&UnavailableStore, 0, 0);
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }
}
