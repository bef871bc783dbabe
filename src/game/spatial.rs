//! Spatial hash grid for broad-phase collision and perception queries
//!
//! Divides the world into square buckets and stores entity handles in each
//! bucket. Queries visit only the buckets a search circle can touch.

use crate::game::state::FxHashMap;
use crate::util::vec2::Vec2;

/// Default bucket size in world units
/// Roughly twice a typical cell radius
pub const ENTITY_GRID_CELL_SIZE: f32 = 128.0;

/// Initial capacity for the bucket map
const ENTITY_GRID_INITIAL_CAPACITY: usize = 512;

/// Initial capacity for entity vectors within a bucket
const ENTITY_CELL_INITIAL_CAPACITY: usize = 8;

/// Bucket key - (x, y) bucket coordinates
pub type CellKey = (i32, i32);

/// Handle into one of the world's entity collections
///
/// Indices are only valid for the snapshot the grid was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpatialEntityId {
    Cell(usize),
    Food(usize),
}

/// Entity data stored in the grid
#[derive(Debug, Clone, Copy)]
pub struct SpatialEntity {
    pub id: SpatialEntityId,
    pub position: Vec2,
    pub radius: f32,
}

/// Spatial hash grid
#[derive(Debug, Clone)]
pub struct SpatialGrid {
    inv_cell_size: f32,
    cells: FxHashMap<CellKey, Vec<SpatialEntity>>,
    /// Largest radius inserted since the last clear; widens queries so
    /// entities whose centers sit in a far bucket are still found
    max_radius: f32,
    len: usize,
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        let mut cells = FxHashMap::default();
        cells.reserve(ENTITY_GRID_INITIAL_CAPACITY);
        Self {
            inv_cell_size: 1.0 / cell_size,
            cells,
            max_radius: 0.0,
            len: 0,
        }
    }

    /// Clear all entities, keeping bucket allocations
    #[inline]
    pub fn clear(&mut self) {
        for cell in self.cells.values_mut() {
            cell.clear();
        }
        self.max_radius = 0.0;
        self.len = 0;
    }

    #[inline]
    fn position_to_cell(&self, position: Vec2) -> CellKey {
        (
            (position.x * self.inv_cell_size).floor() as i32,
            (position.y * self.inv_cell_size).floor() as i32,
        )
    }

    /// Insert an entity (non-finite positions are ignored)
    #[inline]
    pub fn insert(&mut self, entity: SpatialEntity) {
        if !entity.position.is_finite() {
            return;
        }
        let cell_key = self.position_to_cell(entity.position);
        self.cells
            .entry(cell_key)
            .or_insert_with(|| Vec::with_capacity(ENTITY_CELL_INITIAL_CAPACITY))
            .push(entity);
        if entity.radius > self.max_radius {
            self.max_radius = entity.radius;
        }
        self.len += 1;
    }

    /// Entities in every bucket a circle of `radius` around `position` can
    /// reach, including entities whose own radius extends into it.
    ///
    /// Broad phase only: callers still run their exact overlap test.
    pub fn query_radius(&self, position: Vec2, radius: f32) -> impl Iterator<Item = &SpatialEntity> {
        let (cx, cy) = self.position_to_cell(position);
        let reach = (radius.max(0.0) + self.max_radius) * self.inv_cell_size;
        let cell_radius = if reach.is_finite() { reach.ceil() as i32 } else { 0 };

        (-cell_radius..=cell_radius).flat_map(move |dx| {
            (-cell_radius..=cell_radius).flat_map(move |dy| {
                self.cells
                    .get(&(cx + dx, cy + dy))
                    .into_iter()
                    .flat_map(|cell| cell.iter())
            })
        })
    }

    /// Entities whose circle overlaps the query circle
    pub fn query_overlapping(&self, position: Vec2, radius: f32) -> impl Iterator<Item = &SpatialEntity> {
        self.query_radius(position, radius).filter(move |e| {
            let reach = e.radius + radius;
            e.position.distance_sq_to(position) < reach * reach
        })
    }

    /// Rebuild the grid from a collection of entities
    pub fn rebuild(&mut self, entities: impl IntoIterator<Item = SpatialEntity>) {
        self.clear();
        for entity in entities {
            self.insert(entity);
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(ENTITY_GRID_CELL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn food(index: usize, x: f32, y: f32, radius: f32) -> SpatialEntity {
        SpatialEntity {
            id: SpatialEntityId::Food(index),
            position: Vec2::new(x, y),
            radius,
        }
    }

    #[test]
    fn test_insert_and_query() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(food(0, 100.0, 100.0, 5.0));

        let results: Vec<_> = grid.query_radius(Vec2::new(100.0, 100.0), 20.0).collect();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, SpatialEntityId::Food(0));
    }

    #[test]
    fn test_query_covers_large_radius() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(food(0, 0.0, 0.0, 5.0));
        grid.insert(food(1, 400.0, 0.0, 5.0));

        // A 420-unit search must reach several buckets away
        let results: Vec<_> = grid.query_radius(Vec2::ZERO, 420.0).collect();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_large_entity_found_from_far_bucket() {
        let mut grid = SpatialGrid::new(64.0);
        // A large cell centered 150 units away still touches the query point
        grid.insert(SpatialEntity {
            id: SpatialEntityId::Cell(3),
            position: Vec2::new(150.0, 0.0),
            radius: 160.0,
        });

        let hits: Vec<_> = grid.query_overlapping(Vec2::ZERO, 1.0).collect();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_query_overlapping_filters_exactly() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(food(0, 10.0, 0.0, 5.0));
        grid.insert(food(1, 30.0, 0.0, 5.0));

        let hits: Vec<_> = grid.query_overlapping(Vec2::ZERO, 10.0).map(|e| e.id).collect();
        assert_eq!(hits, vec![SpatialEntityId::Food(0)]);
    }

    #[test]
    fn test_non_finite_positions_ignored() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(food(0, f32::NAN, 0.0, 5.0));
        assert!(grid.is_empty());
    }

    #[test]
    fn test_clear() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(food(0, 100.0, 100.0, 10.0));
        grid.clear();

        assert_eq!(grid.query_radius(Vec2::new(100.0, 100.0), 50.0).count(), 0);
        assert_eq!(grid.len(), 0);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut grid = SpatialGrid::new(64.0);
        grid.insert(food(9, 900.0, 900.0, 5.0));
        grid.rebuild((0..3).map(|i| food(i, 100.0, 100.0, 5.0)));

        assert_eq!(grid.len(), 3);
        assert_eq!(grid.query_radius(Vec2::new(900.0, 900.0), 10.0).count(), 0);
        assert_eq!(grid.query_radius(Vec2::new(100.0, 100.0), 10.0).count(), 3);
    }
}
