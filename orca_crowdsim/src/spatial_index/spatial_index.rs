use crate::error::CrowdSimError;
use crate::AgentId;
use crate::Point;

pub trait SpatialIndex {
    fn add_or_update(&mut self, index: AgentId, position: Point) -> Result<(), CrowdSimError>;

    /// All agents strictly closer than `radius` to `position`, in no particular order.
    fn get_neighbours_in_radius(&self, radius: f64, position: Point) -> Vec<AgentId>;

    fn remove_agent(&mut self, _agent: AgentId) {
        // Do Nothing
    }
}
