use thiserror::Error;

use crate::AgentId;

/// Errors raised while configuring or stepping a crowd simulation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CrowdSimError {
    #[error("invalid simulator parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("scenario configuration error: {0}")]
    Config(String),

    #[error("agent {0} is not known to the simulator")]
    UnknownAgent(AgentId),

    #[error("obstacles must be processed before the simulation is stepped")]
    ObstaclesNotProcessed,

    #[error("obstacles were already processed, no more can be added")]
    ObstaclesAlreadyProcessed,

    #[error("an obstacle needs at least 2 vertices, got {0}")]
    DegenerateObstacle(usize),

    #[error("position ({x}, {y}) is not finite")]
    NonFinitePosition { x: f64, y: f64 },

    #[error("expected {expected} frames, one per agent, got {actual}")]
    FrameCountMismatch { expected: usize, actual: usize },

    #[error("batch has {positions} positions but {destinations} destinations")]
    BatchLengthMismatch {
        positions: usize,
        destinations: usize,
    },

    #[error("crowd tracks {tracked} agents but the environment holds {environment}")]
    AgentCountMismatch { tracked: usize, environment: usize },

    #[error("cannot allocate a batch of {count} new agents")]
    SpawnOverflow { count: usize },
}
