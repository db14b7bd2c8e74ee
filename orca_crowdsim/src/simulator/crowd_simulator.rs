use crate::error::CrowdSimError;
use crate::{AgentId, ObstacleId, Point, Vec2f};

/// A 2D multi-agent collision avoidance engine.
///
/// Parameters are fixed when the simulator is built. Obstacles are added first and then
/// processed exactly once; only then may the simulation be stepped.
pub trait CrowdSimulator {
    /// Adds an agent at `position` and returns its handle.
    fn add_agent(&mut self, position: Point) -> Result<AgentId, CrowdSimError>;

    fn set_agent_pref_velocity(&mut self, agent: AgentId, velocity: Vec2f) -> Result<(), CrowdSimError>;

    /// Adds a polygonal obstacle. Vertices are expected in counter-clockwise order.
    fn add_obstacle(&mut self, vertices: &[Point]) -> Result<ObstacleId, CrowdSimError>;

    fn process_obstacles(&mut self) -> Result<(), CrowdSimError>;

    /// Advances the simulation by one time step.
    fn do_step(&mut self) -> Result<(), CrowdSimError>;

    fn agent_position(&self, agent: AgentId) -> Result<Point, CrowdSimError>;

    fn agent_velocity(&self, agent: AgentId) -> Result<Vec2f, CrowdSimError>;

    fn agent_pref_velocity(&self, agent: AgentId) -> Result<Vec2f, CrowdSimError>;

    fn num_agents(&self) -> usize;

    fn global_time(&self) -> f64;

    fn time_step(&self) -> f64;
}
