pub extern crate nalgebra as na;
use na::Vector2;

pub mod environment;
pub mod error;
pub mod event_listener;
pub mod orca_crowd;
pub mod scenario;
pub mod simulator;
pub mod source_sink;
pub mod spatial_index;

pub use crate::environment::{AgentFrame, Environment, PedestrianTrack};
pub use crate::error::CrowdSimError;
pub use crate::event_listener::EventListener;
pub use crate::orca_crowd::{square_obstacle, AgentSlot, OrcaCrowd};
pub use crate::scenario::{Scenario, ScenarioConfig};
pub use crate::simulator::crowd_simulator::CrowdSimulator;
pub use crate::simulator::orca::OrcaSimulator;
pub use crate::simulator::params::SimulatorParams;
pub use crate::source_sink::source_sink::{CrowdGenerator, MonotonicCrowd, PoissonCrowd, SourceSink};
pub use crate::spatial_index::spatial_index::SpatialIndex;

/// Agent ID, as handed out by a simulator
pub type AgentId = usize;

/// Obstacle ID: index of the first vertex of the polygon
pub type ObstacleId = usize;

/// Point
pub type Point = Vector2<f64>;

/// 2-vector
pub type Vec2f = Vector2<f64>;

/// A point with both coordinates set to NaN. Used for agents that have no state.
pub fn nan_point() -> Point {
    Point::new(f64::NAN, f64::NAN)
}
