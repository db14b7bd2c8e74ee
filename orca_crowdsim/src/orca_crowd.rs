use std::sync::{Arc, Mutex, PoisonError};

use crate::environment::{AgentFrame, Environment};
use crate::error::CrowdSimError;
use crate::event_listener::EventListener;
use crate::simulator::crowd_simulator::CrowdSimulator;
use crate::simulator::orca::OrcaSimulator;
use crate::simulator::params::SimulatorParams;
use crate::{nan_point, AgentId, ObstacleId, Point, Vec2f};

/// Factor applied to the preferred velocity once agents are walking
pub const PREFERRED_SPEED_SCALE: f64 = 1.33;
/// Below this distance to the destination agents slow down proportionally
pub const SLOWDOWN_DISTANCE: f64 = 1.0;

/// Whether a pedestrian made it into the simulator
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AgentSlot {
    Registered(AgentId),
    /// No direction to walk in; never stepped
    Absent,
}

impl AgentSlot {
    pub fn handle(&self) -> Option<AgentId> {
        match self {
            AgentSlot::Registered(handle) => Some(*handle),
            AgentSlot::Absent => None,
        }
    }
}

struct TrackedAgent {
    slot: AgentSlot,
    destination: Point,
    arrived: bool,
}

/// Corners of the square obstacle around `center`, counter-clockwise from the bottom left.
/// `radius` is the half diagonal, so each half side is `radius * sqrt(2) / 2`.
pub fn square_obstacle(center: Point, radius: f64) -> [Point; 4] {
    let half_side = radius * std::f64::consts::SQRT_2 / 2f64;
    [
        Point::new(center.x - half_side, center.y - half_side),
        Point::new(center.x + half_side, center.y - half_side),
        Point::new(center.x + half_side, center.y + half_side),
        Point::new(center.x - half_side, center.y + half_side),
    ]
}

/// Unit vector from `position` to `destination`, or `None` when it is undefined
/// (both points coincide or a coordinate is not a number).
pub fn initial_preferred_velocity(position: Point, destination: Point) -> Option<Vec2f> {
    let direction = (destination - position) / (destination - position).norm();
    (direction.x.is_finite() && direction.y.is_finite()).then_some(direction)
}

/// Preferred velocity for the next step: full speed towards the destination, slowing down
/// linearly inside `SLOWDOWN_DISTANCE`.
pub fn preferred_velocity(position: Point, destination: Point) -> Vec2f {
    let to_goal = destination - position;
    let distance = to_goal.norm();
    let direction = if distance > SLOWDOWN_DISTANCE {
        to_goal / distance
    } else {
        to_goal
    };
    direction * PREFERRED_SPEED_SCALE
}

/// Steps an ORCA simulator and records the pedestrians it moves into an [`Environment`].
///
/// Pedestrian `i` of the environment is slot `i` here. The crowd owns its simulator; the
/// environment is only borrowed while adding agents or stepping.
pub struct OrcaCrowd<S: CrowdSimulator> {
    simulator: S,
    agents: Vec<TrackedAgent>,
    obstacles: Vec<ObstacleId>,
    /// Arrival threshold
    ped_radius: f64,
    event_listeners: Vec<Arc<Mutex<dyn EventListener>>>,
}

impl OrcaCrowd<OrcaSimulator> {
    /// Builds an ORCA simulator with pedestrian defaults and registers the environment's scene.
    pub fn from_environment(env: &Environment, time_step: f64) -> Result<Self, CrowdSimError> {
        let params = SimulatorParams::for_pedestrians(time_step, env.ped_radius());
        Self::with_params(env, params)
    }

    pub fn with_params(env: &Environment, params: SimulatorParams) -> Result<Self, CrowdSimError> {
        Self::new(OrcaSimulator::new(params)?, env)
    }
}

impl<S: CrowdSimulator> OrcaCrowd<S> {
    /// Takes ownership of `simulator`, registers every obstacle and then every pedestrian of
    /// `env` at its newest recorded position.
    pub fn new(simulator: S, env: &Environment) -> Result<Self, CrowdSimError> {
        let mut crowd = OrcaCrowd {
            simulator,
            agents: vec![],
            obstacles: vec![],
            ped_radius: env.ped_radius(),
            event_listeners: vec![],
        };

        crowd.register_obstacles(env.obstacles(), env.obstacle_radius())?;

        for track in env.tracks() {
            let position = track.position.last().copied().unwrap_or_else(nan_point);
            let slot = crowd.register_agent(position, track.destination())?;
            crowd.agents.push(TrackedAgent {
                slot,
                destination: track.destination(),
                arrived: false,
            });
        }

        log::info!(
            "ORCA crowd ready: {} of {} pedestrians registered, {} obstacles",
            crowd.registered_count(),
            crowd.agent_count(),
            crowd.obstacles.len()
        );
        Ok(crowd)
    }

    pub fn add_event_listener(&mut self, listener: Arc<Mutex<dyn EventListener>>) {
        self.event_listeners.push(listener);
    }

    /// Registers one square per centre, then processes obstacles. Must run once, before the
    /// first step.
    fn register_obstacles(&mut self, centers: &[Point], radius: f64) -> Result<(), CrowdSimError> {
        for center in centers {
            let id = self.simulator.add_obstacle(&square_obstacle(*center, radius))?;
            self.obstacles.push(id);
        }
        self.simulator.process_obstacles()
    }

    fn register_agent(&mut self, position: Point, destination: Point) -> Result<AgentSlot, CrowdSimError> {
        match initial_preferred_velocity(position, destination) {
            Some(pref_velocity) => {
                let handle = self.simulator.add_agent(position)?;
                self.simulator.set_agent_pref_velocity(handle, pref_velocity)?;
                Ok(AgentSlot::Registered(handle))
            }
            None => {
                log::warn!(
                    "Skipping agent at {:?} heading to {:?}: no direction to walk in",
                    position,
                    destination
                );
                Ok(AgentSlot::Absent)
            }
        }
    }

    fn check_alignment(&self, env: &Environment) -> Result<(), CrowdSimError> {
        if env.num_pedestrians() != self.agents.len() {
            return Err(CrowdSimError::AgentCountMismatch {
                tracked: self.agents.len(),
                environment: env.num_pedestrians(),
            });
        }
        Ok(())
    }

    /// Adds a batch of pedestrians that appear mid-simulation, to both the simulator and the
    /// environment. Every entry takes a slot, including those that end up `Absent`.
    pub fn add_agents(
        &mut self,
        env: &mut Environment,
        positions: &[Point],
        destinations: &[Point],
    ) -> Result<Vec<AgentSlot>, CrowdSimError> {
        if positions.len() != destinations.len() {
            return Err(CrowdSimError::BatchLengthMismatch {
                positions: positions.len(),
                destinations: destinations.len(),
            });
        }
        self.check_alignment(env)?;

        let mut slots = Vec::with_capacity(positions.len());
        for (position, destination) in positions.iter().zip(destinations) {
            let slot = self.register_agent(*position, *destination)?;
            let pedestrian = env.add_pedestrian(*position, *destination);
            self.agents.push(TrackedAgent {
                slot,
                destination: *destination,
                arrived: false,
            });

            for listener in &self.event_listeners {
                let mut listener = listener.lock().unwrap_or_else(PoisonError::into_inner);
                match slot {
                    AgentSlot::Registered(_) => listener.agent_spawned(pedestrian, *position),
                    AgentSlot::Absent => listener.agent_skipped(pedestrian),
                }
            }
            slots.push(slot);
        }
        Ok(slots)
    }

    /// Advances the simulator one step and appends the new state of every pedestrian to `env`.
    pub fn step(&mut self, env: &mut Environment) -> Result<(), CrowdSimError> {
        self.check_alignment(env)?;
        self.simulator.do_step()?;

        let mut frames = Vec::with_capacity(self.agents.len());
        let mut newly_arrived = vec![];
        for (pedestrian, agent) in self.agents.iter_mut().enumerate() {
            let handle = match agent.slot {
                AgentSlot::Registered(handle) => handle,
                AgentSlot::Absent => {
                    frames.push(AgentFrame::missing());
                    continue;
                }
            };

            let mut position = self.simulator.agent_position(handle)?;
            let mut velocity = self.simulator.agent_velocity(handle)?;
            self.simulator
                .set_agent_pref_velocity(handle, preferred_velocity(position, agent.destination))?;

            // Once arrived an agent stays arrived
            let arrived = agent.arrived || (agent.destination - position).norm() < self.ped_radius;
            if arrived && !agent.arrived {
                newly_arrived.push(pedestrian);
            }
            agent.arrived = arrived;

            if arrived {
                position = nan_point();
                velocity = nan_point();
            }

            frames.push(AgentFrame {
                position,
                velocity,
                direction: velocity.y.atan2(velocity.x),
                arrived,
                active: !arrived,
            });
        }

        env.append_step(&frames)?;

        for pedestrian in &newly_arrived {
            log::info!("Pedestrian {} arrived at step {}", pedestrian, env.num_steps());
            for listener in &self.event_listeners {
                listener
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .agent_arrived(*pedestrian);
            }
        }
        log::debug!(
            "Step {} recorded, {} pedestrians still walking",
            env.num_steps(),
            self.active_count()
        );
        Ok(())
    }

    pub fn simulator(&self) -> &S {
        &self.simulator
    }

    /// Number of tracked slots, absent ones included
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    pub fn registered_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| matches!(agent.slot, AgentSlot::Registered(_)))
            .count()
    }

    /// Registered agents that have not arrived yet
    pub fn active_count(&self) -> usize {
        self.agents
            .iter()
            .filter(|agent| agent.slot.handle().is_some() && !agent.arrived)
            .count()
    }

    pub fn slot(&self, pedestrian: usize) -> Option<AgentSlot> {
        self.agents.get(pedestrian).map(|agent| agent.slot)
    }

    pub fn slots(&self) -> Vec<AgentSlot> {
        self.agents.iter().map(|agent| agent.slot).collect()
    }

    pub fn obstacles(&self) -> &[ObstacleId] {
        &self.obstacles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_square_obstacle_corners() {
        let r = 2f64;
        let h = r * std::f64::consts::SQRT_2 / 2f64;
        let corners = square_obstacle(Point::new(0f64, 0f64), r);
        assert_eq!(corners[0], Point::new(-h, -h));
        assert_eq!(corners[1], Point::new(h, -h));
        assert_eq!(corners[2], Point::new(h, h));
        assert_eq!(corners[3], Point::new(-h, h));
    }

    #[test]
    fn test_initial_preferred_velocity() {
        let v = initial_preferred_velocity(Point::new(1f64, 1f64), Point::new(4f64, 5f64)).unwrap();
        assert_relative_eq!(v.norm(), 1f64, epsilon = 1e-12);
        assert_relative_eq!(v.x, 0.6f64, epsilon = 1e-12);
        assert_relative_eq!(v.y, 0.8f64, epsilon = 1e-12);

        assert_eq!(initial_preferred_velocity(Point::new(1f64, 1f64), Point::new(1f64, 1f64)), None);
        assert_eq!(initial_preferred_velocity(Point::new(f64::NAN, 1f64), Point::new(1f64, 1f64)), None);
        assert_eq!(initial_preferred_velocity(Point::new(0f64, 1f64), Point::new(1f64, f64::NAN)), None);
    }

    #[test]
    fn test_preferred_velocity_slows_down_near_goal() {
        let far = preferred_velocity(Point::new(0f64, 0f64), Point::new(10f64, 0f64));
        assert_relative_eq!(far.x, 1.33f64, epsilon = 1e-12);
        assert_relative_eq!(far.y, 0f64);

        let near = preferred_velocity(Point::new(0f64, 0f64), Point::new(0f64, 0.5f64));
        assert_relative_eq!(near.y, 0.665f64, epsilon = 1e-12);
        assert_relative_eq!(near.x, 0f64);
    }
}
