use crate::Point;

/// Receives lifecycle notifications about pedestrians. Indices are pedestrian slots in the
/// environment, not simulator handles.
pub trait EventListener {
    /// Called each time an agent is registered with the simulator
    fn agent_spawned(&mut self, pedestrian: usize, position: Point);

    /// Called when an agent could not be registered because it has no direction to walk in
    fn agent_skipped(&mut self, _pedestrian: usize) {}

    /// Called on the first step an agent is within reach of its destination
    fn agent_arrived(&mut self, pedestrian: usize);
}
