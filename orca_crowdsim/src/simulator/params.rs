use crate::error::CrowdSimError;

/// Neighbour search distance used for pedestrians
pub const PEDESTRIAN_NEIGHBOR_DIST: f64 = 1.5;
/// Number of neighbours each pedestrian takes into account
pub const PEDESTRIAN_MAX_NEIGHBORS: usize = 5;
/// Time horizon for other agents
pub const PEDESTRIAN_TIME_HORIZON: f64 = 10.0;
/// Time horizon for obstacles
pub const PEDESTRIAN_TIME_HORIZON_OBST: f64 = 10.0;
/// Upper bound on pedestrian speed
pub const PEDESTRIAN_MAX_SPEED: f64 = 2.5;

/// Kinematic parameters shared by every agent of a simulator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulatorParams {
    /// Integration step in seconds
    pub time_step: f64,
    /// How far each agent looks for other agents
    pub neighbor_dist: f64,
    pub max_neighbors: usize,
    /// Minimal amount of time for which velocities are safe with respect to other agents
    pub time_horizon: f64,
    /// Minimal amount of time for which velocities are safe with respect to obstacles
    pub time_horizon_obst: f64,
    pub radius: f64,
    pub max_speed: f64,
}

impl SimulatorParams {
    /// Pedestrian defaults. Only the time step and the body radius vary per scenario.
    pub fn for_pedestrians(time_step: f64, radius: f64) -> Self {
        Self {
            time_step,
            neighbor_dist: PEDESTRIAN_NEIGHBOR_DIST,
            max_neighbors: PEDESTRIAN_MAX_NEIGHBORS,
            time_horizon: PEDESTRIAN_TIME_HORIZON,
            time_horizon_obst: PEDESTRIAN_TIME_HORIZON_OBST,
            radius,
            max_speed: PEDESTRIAN_MAX_SPEED,
        }
    }

    pub fn validate(&self) -> Result<(), CrowdSimError> {
        check_positive("time_step", self.time_step)?;
        check_positive("neighbor_dist", self.neighbor_dist)?;
        check_positive("time_horizon", self.time_horizon)?;
        check_positive("time_horizon_obst", self.time_horizon_obst)?;
        check_positive("radius", self.radius)?;
        check_positive("max_speed", self.max_speed)?;
        Ok(())
    }
}

fn check_positive(name: &'static str, value: f64) -> Result<(), CrowdSimError> {
    if value.is_finite() && value > 0f64 {
        Ok(())
    } else {
        Err(CrowdSimError::InvalidParameter {
            name,
            reason: format!("expected a finite positive number, got {}", value),
        })
    }
}
