use crate::error::CrowdSimError;
use crate::simulator::crowd_simulator::CrowdSimulator;
use crate::simulator::linear_program::{self, OrcaLine};
use crate::simulator::obstacle::ObstacleSet;
use crate::simulator::params::SimulatorParams;
use crate::spatial_index::hash_grid_2d::HashGrid2D;
use crate::spatial_index::spatial_index::SpatialIndex;
use crate::{AgentId, ObstacleId, Point, Vec2f};

/// State of a single simulated body
#[derive(Clone, Copy, Debug)]
struct OrcaAgent {
    position: Point,
    velocity: Vec2f,
    pref_velocity: Vec2f,
}

/// Optimal Reciprocal Collision Avoidance simulator.
///
/// Each step every agent picks the velocity closest to its preferred velocity that stays
/// collision free for `time_horizon` against its neighbours (each side takes half of the
/// avoidance effort) and for `time_horizon_obst` against obstacle edges.
pub struct OrcaSimulator<T: SpatialIndex = HashGrid2D> {
    params: SimulatorParams,
    agents: Vec<OrcaAgent>,
    obstacles: ObstacleSet,
    /// Spatial Index. Used internally to find neighbours
    spatial_index: T,
    global_time: f64,
}

impl OrcaSimulator<HashGrid2D> {
    /// Creates a simulator backed by a hash grid sized to the neighbour distance.
    pub fn new(params: SimulatorParams) -> Result<Self, CrowdSimError> {
        Self::with_spatial_index(params, HashGrid2D::new(params.neighbor_dist))
    }
}

impl<T: SpatialIndex> OrcaSimulator<T> {
    pub fn with_spatial_index(params: SimulatorParams, spatial_index: T) -> Result<Self, CrowdSimError> {
        params.validate()?;
        Ok(Self {
            params,
            agents: vec![],
            obstacles: ObstacleSet::new(),
            spatial_index,
            global_time: 0f64,
        })
    }

    pub fn params(&self) -> &SimulatorParams {
        &self.params
    }

    pub fn obstacles(&self) -> &ObstacleSet {
        &self.obstacles
    }

    fn agent(&self, agent: AgentId) -> Result<&OrcaAgent, CrowdSimError> {
        self.agents.get(agent).ok_or(CrowdSimError::UnknownAgent(agent))
    }

    /// Agents within the neighbour distance, nearest first, capped at `max_neighbors`.
    fn agent_neighbours(&self, agent_id: AgentId) -> Vec<AgentId> {
        if self.params.max_neighbors == 0 {
            return vec![];
        }
        let position = self.agents[agent_id].position;
        let mut neighbours: Vec<(f64, AgentId)> = self
            .spatial_index
            .get_neighbours_in_radius(self.params.neighbor_dist, position)
            .into_iter()
            .filter(|id| *id != agent_id)
            .map(|id| ((self.agents[id].position - position).norm_squared(), id))
            .collect();
        neighbours.sort_by(|(a_dist, a_id), (b_dist, b_id)| a_dist.total_cmp(b_dist).then(a_id.cmp(b_id)));
        neighbours.truncate(self.params.max_neighbors);
        neighbours.into_iter().map(|(_, id)| id).collect()
    }

    fn agent_orca_line(&self, agent: &OrcaAgent, other: &OrcaAgent) -> OrcaLine {
        let params = &self.params;
        let inv_time_horizon = 1f64 / params.time_horizon;

        let relative_position = other.position - agent.position;
        let relative_velocity = agent.velocity - other.velocity;
        let dist_sq = relative_position.norm_squared();
        let combined_radius = 2f64 * params.radius;
        let combined_radius_sq = combined_radius * combined_radius;

        let direction;
        let u;
        if dist_sq > combined_radius_sq {
            // No collision yet
            let w = relative_velocity - relative_position * inv_time_horizon;
            let w_length_sq = w.norm_squared();
            let dot_product1 = w.dot(&relative_position);

            if dot_product1 < 0f64 && dot_product1 * dot_product1 > combined_radius_sq * w_length_sq {
                // Project on cut-off circle
                let w_length = w_length_sq.sqrt();
                let unit_w = w / w_length;
                direction = Vec2f::new(unit_w.y, -unit_w.x);
                u = unit_w * (combined_radius * inv_time_horizon - w_length);
            } else {
                // Project on legs
                let leg = (dist_sq - combined_radius_sq).sqrt();
                let rel = relative_position;
                direction = if linear_program::det(&rel, &w) > 0f64 {
                    Vec2f::new(rel.x * leg - rel.y * combined_radius, rel.x * combined_radius + rel.y * leg)
                        / dist_sq
                } else {
                    -Vec2f::new(rel.x * leg + rel.y * combined_radius, -rel.x * combined_radius + rel.y * leg)
                        / dist_sq
                };
                let dot_product2 = relative_velocity.dot(&direction);
                u = direction * dot_product2 - relative_velocity;
            }
        } else {
            // Already colliding: resolve within one time step
            let inv_time_step = 1f64 / params.time_step;
            let w = relative_velocity - relative_position * inv_time_step;
            let w_length = w.norm();
            let unit_w = if w_length > 0f64 { w / w_length } else { Vec2f::new(1f64, 0f64) };
            direction = Vec2f::new(unit_w.y, -unit_w.x);
            u = unit_w * (combined_radius * inv_time_step - w_length);
        }

        OrcaLine::new(agent.velocity + u * 0.5f64, direction)
    }

    fn compute_new_velocity(&self, agent_id: AgentId) -> Vec2f {
        let params = &self.params;
        let agent = &self.agents[agent_id];

        let obstacle_range = params.time_horizon_obst * params.max_speed + params.radius;
        let obstacle_neighbours = self.obstacles.neighbours(&agent.position, obstacle_range * obstacle_range);
        let mut lines = self.obstacles.orca_lines(
            &obstacle_neighbours,
            &agent.position,
            &agent.velocity,
            params.radius,
            params.time_horizon_obst,
        );
        let num_obst_lines = lines.len();

        for other_id in self.agent_neighbours(agent_id) {
            lines.push(self.agent_orca_line(agent, &self.agents[other_id]));
        }

        linear_program::solve(&lines, num_obst_lines, params.max_speed, &agent.pref_velocity)
    }
}

impl<T: SpatialIndex> CrowdSimulator for OrcaSimulator<T> {
    fn add_agent(&mut self, position: Point) -> Result<AgentId, CrowdSimError> {
        let agent_id = self.agents.len();
        self.spatial_index.add_or_update(agent_id, position)?;
        self.agents.push(OrcaAgent {
            position,
            velocity: Vec2f::zeros(),
            pref_velocity: Vec2f::zeros(),
        });
        Ok(agent_id)
    }

    fn set_agent_pref_velocity(&mut self, agent: AgentId, velocity: Vec2f) -> Result<(), CrowdSimError> {
        let state = self.agents.get_mut(agent).ok_or(CrowdSimError::UnknownAgent(agent))?;
        state.pref_velocity = velocity;
        Ok(())
    }

    fn add_obstacle(&mut self, vertices: &[Point]) -> Result<ObstacleId, CrowdSimError> {
        self.obstacles.add_polygon(vertices)
    }

    fn process_obstacles(&mut self) -> Result<(), CrowdSimError> {
        self.obstacles.process()
    }

    fn do_step(&mut self) -> Result<(), CrowdSimError> {
        if !self.obstacles.is_processed() && !self.obstacles.vertices().is_empty() {
            return Err(CrowdSimError::ObstaclesNotProcessed);
        }

        // Every agent decides on the same snapshot before anybody moves
        let new_velocities: Vec<Vec2f> = (0..self.agents.len())
            .map(|agent_id| self.compute_new_velocity(agent_id))
            .collect();

        let time_step = self.params.time_step;
        for (agent_id, velocity) in new_velocities.into_iter().enumerate() {
            let agent = &mut self.agents[agent_id];
            agent.velocity = velocity;
            agent.position += velocity * time_step;
            self.spatial_index.add_or_update(agent_id, agent.position)?;
        }

        self.global_time += time_step;
        log::debug!("ORCA step done, t = {:.3}s, {} agents", self.global_time, self.agents.len());
        Ok(())
    }

    fn agent_position(&self, agent: AgentId) -> Result<Point, CrowdSimError> {
        Ok(self.agent(agent)?.position)
    }

    fn agent_velocity(&self, agent: AgentId) -> Result<Vec2f, CrowdSimError> {
        Ok(self.agent(agent)?.velocity)
    }

    fn agent_pref_velocity(&self, agent: AgentId) -> Result<Vec2f, CrowdSimError> {
        Ok(self.agent(agent)?.pref_velocity)
    }

    fn num_agents(&self) -> usize {
        self.agents.len()
    }

    fn global_time(&self) -> f64 {
        self.global_time
    }

    fn time_step(&self) -> f64 {
        self.params.time_step
    }
}
