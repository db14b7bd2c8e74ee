use crate::error::CrowdSimError;
use crate::spatial_index::spatial_index::SpatialIndex;
use crate::{AgentId, Point};

use std::collections::{HashMap, HashSet};

type Cell = (i64, i64);

/// A sparse 2D grid with a set of agents in each occupied cell.
/// Updates are O(1) and a radius search visits O(r^2) cells. Unlike a dense grid the world has
/// no bounds, which matters because ORCA agents are free to wander anywhere on the plane.
/// It degrades when every agent sits in the same cell, but crowd density caps how many
/// pedestrians fit in one cell anyway.
pub struct HashGrid2D {
    cells: HashMap<Cell, HashSet<AgentId>>,
    id_to_cell: HashMap<AgentId, Cell>,
    id_to_exact_location: HashMap<AgentId, Point>,
    /// Width of each square cell
    resolution: f64,
}

impl HashGrid2D {
    /// Creates an empty grid
    /// # Arguments
    /// * `cell_size` - Each cell will be of `cell_size`x`cell_size` dimensions. A good choice is
    /// the neighbour search radius.
    pub fn new(cell_size: f64) -> Self {
        Self {
            cells: HashMap::new(),
            id_to_cell: HashMap::new(),
            id_to_exact_location: HashMap::new(),
            resolution: cell_size,
        }
    }

    pub fn len(&self) -> usize {
        self.id_to_cell.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_cell.is_empty()
    }

    fn location_to_cell(&self, point: Point) -> Cell {
        (
            (point.x / self.resolution).floor() as i64,
            (point.y / self.resolution).floor() as i64,
        )
    }

    fn get_bounds(&self, radius: f64, position: Point) -> (Cell, Cell) {
        let lower = self.location_to_cell(Point::new(position.x - radius, position.y - radius));
        let upper = self.location_to_cell(Point::new(position.x + radius, position.y + radius));
        (lower, upper)
    }
}

impl SpatialIndex for HashGrid2D {
    fn add_or_update(&mut self, id: AgentId, position: Point) -> Result<(), CrowdSimError> {
        if !position.x.is_finite() || !position.y.is_finite() {
            return Err(CrowdSimError::NonFinitePosition {
                x: position.x,
                y: position.y,
            });
        }

        let new_cell = self.location_to_cell(position);
        match self.id_to_cell.get(&id).copied() {
            Some(old_cell) if old_cell == new_cell => {}
            Some(old_cell) => {
                if let Some(agents) = self.cells.get_mut(&old_cell) {
                    agents.remove(&id);
                    if agents.is_empty() {
                        self.cells.remove(&old_cell);
                    }
                }
                self.cells.entry(new_cell).or_default().insert(id);
                self.id_to_cell.insert(id, new_cell);
            }
            None => {
                self.cells.entry(new_cell).or_default().insert(id);
                self.id_to_cell.insert(id, new_cell);
            }
        }

        self.id_to_exact_location.insert(id, position);
        Ok(())
    }

    fn get_neighbours_in_radius(&self, radius: f64, position: Point) -> Vec<AgentId> {
        let mut agents = vec![];
        let ((left, bottom), (right, top)) = self.get_bounds(radius, position);

        for x_idx in left..=right {
            for y_idx in bottom..=top {
                if let Some(cell) = self.cells.get(&(x_idx, y_idx)) {
                    let inliers = cell.iter().filter(|agent_id| {
                        (self.id_to_exact_location[*agent_id] - position).norm() < radius
                    });
                    agents.extend(inliers);
                }
            }
        }
        agents
    }

    fn remove_agent(&mut self, id: AgentId) {
        if let Some(cell) = self.id_to_cell.remove(&id) {
            if let Some(agents) = self.cells.get_mut(&cell) {
                agents.remove(&id);
                if agents.is_empty() {
                    self.cells.remove(&cell);
                }
            }
            self.id_to_exact_location.remove(&id);
        }
    }
}
