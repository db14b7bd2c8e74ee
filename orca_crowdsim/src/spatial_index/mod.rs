pub mod hash_grid_2d;
pub mod spatial_index;
