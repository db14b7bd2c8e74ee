use orca_crowdsim::*;

use approx::assert_relative_eq;

/// Simulator stand-in that records every call and moves agents by their preferred velocity.
#[derive(Default)]
struct RecordingSimulator {
    positions: Vec<Point>,
    velocities: Vec<Vec2f>,
    pref_velocities: Vec<Vec2f>,
    obstacles: Vec<Vec<Point>>,
    processed: bool,
    add_agent_calls: usize,
    steps: usize,
    /// Displacement applied on top of the preferred velocity from the given step on
    drift: Option<(usize, Vec2f)>,
}

impl CrowdSimulator for RecordingSimulator {
    fn add_agent(&mut self, position: Point) -> Result<AgentId, CrowdSimError> {
        self.add_agent_calls += 1;
        self.positions.push(position);
        self.velocities.push(Vec2f::zeros());
        self.pref_velocities.push(Vec2f::zeros());
        Ok(self.positions.len() - 1)
    }

    fn set_agent_pref_velocity(&mut self, agent: AgentId, velocity: Vec2f) -> Result<(), CrowdSimError> {
        let pref = self
            .pref_velocities
            .get_mut(agent)
            .ok_or(CrowdSimError::UnknownAgent(agent))?;
        *pref = velocity;
        Ok(())
    }

    fn add_obstacle(&mut self, vertices: &[Point]) -> Result<ObstacleId, CrowdSimError> {
        if self.processed {
            return Err(CrowdSimError::ObstaclesAlreadyProcessed);
        }
        self.obstacles.push(vertices.to_vec());
        Ok(self.obstacles.len() - 1)
    }

    fn process_obstacles(&mut self) -> Result<(), CrowdSimError> {
        self.processed = true;
        Ok(())
    }

    fn do_step(&mut self) -> Result<(), CrowdSimError> {
        if !self.processed {
            return Err(CrowdSimError::ObstaclesNotProcessed);
        }
        let dt = self.time_step();
        for agent in 0..self.positions.len() {
            self.velocities[agent] = self.pref_velocities[agent];
            self.positions[agent] += self.velocities[agent] * dt;
            if let Some((from_step, drift)) = self.drift {
                if self.steps >= from_step {
                    self.positions[agent] += drift;
                }
            }
        }
        self.steps += 1;
        Ok(())
    }

    fn agent_position(&self, agent: AgentId) -> Result<Point, CrowdSimError> {
        self.positions.get(agent).copied().ok_or(CrowdSimError::UnknownAgent(agent))
    }

    fn agent_velocity(&self, agent: AgentId) -> Result<Vec2f, CrowdSimError> {
        self.velocities.get(agent).copied().ok_or(CrowdSimError::UnknownAgent(agent))
    }

    fn agent_pref_velocity(&self, agent: AgentId) -> Result<Vec2f, CrowdSimError> {
        self.pref_velocities
            .get(agent)
            .copied()
            .ok_or(CrowdSimError::UnknownAgent(agent))
    }

    fn num_agents(&self) -> usize {
        self.positions.len()
    }

    fn global_time(&self) -> f64 {
        self.steps as f64 * self.time_step()
    }

    fn time_step(&self) -> f64 {
        0.1
    }
}

fn environment(positions: &[Point], destinations: &[Point]) -> Environment {
    Environment::new(0.5, 1.0, vec![], positions, destinations).unwrap()
}

#[test]
fn test_registered_agents_get_unit_preferred_velocity() {
    let positions = [Point::new(0f64, 0f64), Point::new(2f64, 3f64)];
    let destinations = [Point::new(3f64, 4f64), Point::new(-1f64, 3f64)];
    let env = environment(&positions, &destinations);
    let crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();

    assert_eq!(crowd.agent_count(), 2);
    for (i, (p, g)) in positions.iter().zip(destinations.iter()).enumerate() {
        let handle = crowd.slot(i).unwrap().handle().expect("agent should be registered");
        let pref = crowd.simulator().agent_pref_velocity(handle).unwrap();
        assert_relative_eq!(pref.norm(), 1f64, epsilon = 1e-12);
        let expected = (g - p).normalize();
        assert_relative_eq!(pref.x, expected.x, epsilon = 1e-12);
        assert_relative_eq!(pref.y, expected.y, epsilon = 1e-12);
        assert_eq!(crowd.simulator().agent_position(handle).unwrap(), *p);
    }
}

#[test]
fn test_agent_at_destination_is_not_registered() {
    let env = environment(
        &[Point::new(1f64, 1f64), Point::new(0f64, 0f64), Point::new(f64::NAN, 0f64)],
        &[Point::new(1f64, 1f64), Point::new(4f64, 0f64), Point::new(1f64, 0f64)],
    );
    let crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();

    assert_eq!(crowd.simulator().add_agent_calls, 1);
    assert_eq!(crowd.agent_count(), 3);
    assert_eq!(crowd.registered_count(), 1);
    assert_eq!(crowd.slot(0), Some(AgentSlot::Absent));
    assert_eq!(crowd.slot(1), Some(AgentSlot::Registered(0)));
    assert_eq!(crowd.slot(2), Some(AgentSlot::Absent));

    // Only the registered pedestrian starts out walking
    let seed_masks: Vec<bool> = env.tracks().iter().map(|track| track.mask[0]).collect();
    assert_eq!(seed_masks, vec![false, true, false]);
    assert_eq!(env.active_count(), crowd.active_count());
}

#[test]
fn test_obstacles_registered_as_squares_then_processed() {
    let r = 2f64;
    let h = r * std::f64::consts::SQRT_2 / 2f64;
    let env = Environment::new(
        0.5,
        r,
        vec![Point::new(0f64, 0f64), Point::new(10f64, 0f64)],
        &[],
        &[],
    )
    .unwrap();
    let crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();
    let sim = crowd.simulator();

    assert!(sim.processed);
    assert_eq!(crowd.obstacles(), &[0, 1]);
    assert_eq!(sim.obstacles.len(), 2);

    let square = &sim.obstacles[0];
    assert_eq!(square.len(), 4);
    for vertex in square {
        assert_relative_eq!(vertex.x.abs(), h, epsilon = 1e-12);
        assert_relative_eq!(vertex.y.abs(), h, epsilon = 1e-12);
    }
    // Counter-clockwise: positive signed area
    let area: f64 = (0..4)
        .map(|i| {
            let a = square[i];
            let b = square[(i + 1) % 4];
            a.x * b.y - b.x * a.y
        })
        .sum::<f64>()
        / 2f64;
    assert_relative_eq!(area, (2f64 * h) * (2f64 * h), epsilon = 1e-12);

    assert_relative_eq!(sim.obstacles[1][0].x, 10f64 - h, epsilon = 1e-12);
}

#[test]
fn test_step_grows_every_buffer_by_one() {
    let mut env = environment(
        &[Point::new(0f64, 0f64), Point::new(2f64, 2f64)],
        &[Point::new(10f64, 0f64), Point::new(2f64, 2f64)],
    );
    let mut crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();

    for step in 1..=5 {
        crowd.step(&mut env).unwrap();
        assert_eq!(env.num_steps(), step);
        for track in env.tracks() {
            assert_eq!(track.position.len(), step + 1);
            assert_eq!(track.velocity.len(), step + 1);
            assert_eq!(track.direction.len(), step + 1);
            assert_eq!(track.arrive_flag.len(), step + 1);
            assert_eq!(track.mask.len(), step + 1);
        }
    }

    let walker = env.track(0).unwrap().latest().unwrap();
    assert!(walker.active);
    assert!(!walker.arrived);
    assert_relative_eq!(walker.direction, 0f64, epsilon = 1e-12);
    // First step uses the unit preferred velocity, later ones the 1.33 scaled one
    assert_relative_eq!(walker.position.x, 0.1f64 + 4f64 * 0.133f64, epsilon = 1e-9);

    let absent = env.track(1).unwrap().latest().unwrap();
    assert!(absent.position.x.is_nan());
    assert!(absent.velocity.x.is_nan());
    assert!(absent.direction.is_nan());
    assert!(!absent.active);
    assert_eq!(crowd.simulator().add_agent_calls, 1);
}

#[test]
fn test_step_rejects_misaligned_environment() {
    let mut env = environment(&[Point::new(0f64, 0f64)], &[Point::new(1f64, 0f64)]);
    let mut crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();
    env.add_pedestrian(Point::new(5f64, 5f64), Point::new(6f64, 6f64));

    assert_eq!(
        crowd.step(&mut env),
        Err(CrowdSimError::AgentCountMismatch {
            tracked: 1,
            environment: 2
        })
    );
}

#[test]
fn test_single_agent_arrives_and_stays_arrived() {
    let destination = Point::new(5f64, 0f64);
    let mut env = environment(&[Point::new(0f64, 0f64)], &[destination]);
    let mut crowd = OrcaCrowd::from_environment(&env, 0.1).unwrap();

    let mut arrival_step = None;
    for step in 1..=200 {
        crowd.step(&mut env).unwrap();
        let frame = env.track(0).unwrap().latest().unwrap();
        if frame.arrived {
            let handle = crowd.slot(0).unwrap().handle().unwrap();
            let position = crowd.simulator().agent_position(handle).unwrap();
            assert!((position - destination).norm() < 0.5f64);
            arrival_step = Some(step);
            break;
        }
        assert!(frame.active);
        assert!(frame.position.x.is_finite());
    }
    let arrival_step = arrival_step.expect("agent never arrived");
    // 5m at 1.33 m/s takes roughly 35 steps of 0.1s
    assert!(arrival_step > 20 && arrival_step < 80, "arrived at step {}", arrival_step);

    for _ in 0..10 {
        crowd.step(&mut env).unwrap();
    }
    let track = env.track(0).unwrap();
    for t in arrival_step..track.len() {
        assert!(track.arrive_flag[t]);
        assert!(!track.mask[t]);
        assert!(track.position[t].x.is_nan() && track.position[t].y.is_nan());
        assert!(track.velocity[t].x.is_nan() && track.velocity[t].y.is_nan());
        assert!(track.direction[t].is_nan());
    }
    assert_eq!(env.active_count(), 0);
    assert_eq!(crowd.active_count(), 0);
}

#[test]
fn test_arrival_is_monotone_even_if_pushed_away() {
    // From the second step on something shoves the agent far from its destination
    let sim = RecordingSimulator {
        drift: Some((1, Vec2f::new(0f64, 3f64))),
        ..Default::default()
    };
    let mut env = environment(&[Point::new(0f64, 0f64)], &[Point::new(0.2f64, 0f64)]);
    let mut crowd = OrcaCrowd::new(sim, &env).unwrap();

    crowd.step(&mut env).unwrap();
    assert!(env.track(0).unwrap().latest().unwrap().arrived);

    for _ in 0..5 {
        crowd.step(&mut env).unwrap();
        let handle = crowd.slot(0).unwrap().handle().unwrap();
        assert!(crowd.simulator().agent_position(handle).unwrap().y > 2f64);

        let frame = env.track(0).unwrap().latest().unwrap();
        assert!(frame.arrived);
        assert!(!frame.active);
    }
}

#[test]
fn test_add_agents_dynamically() {
    let mut env = environment(&[Point::new(0f64, 0f64)], &[Point::new(5f64, 0f64)]);
    let mut crowd = OrcaCrowd::from_environment(&env, 0.1).unwrap();
    crowd.step(&mut env).unwrap();
    crowd.step(&mut env).unwrap();

    let before = crowd.agent_count();
    let slots = crowd
        .add_agents(
            &mut env,
            &[Point::new(0f64, 3f64), Point::new(0f64, -3f64)],
            &[Point::new(5f64, 3f64), Point::new(5f64, -3f64)],
        )
        .unwrap();

    assert_eq!(crowd.agent_count(), before + 2);
    assert_eq!(slots, vec![AgentSlot::Registered(1), AgentSlot::Registered(2)]);
    assert_eq!(crowd.simulator().num_agents(), 3);
    assert_eq!(env.num_pedestrians(), 3);
    for track in env.tracks() {
        assert_eq!(track.len(), env.history_len());
    }

    crowd.step(&mut env).unwrap();
    let newcomer = env.track(1).unwrap();
    assert!(newcomer.position[0].x.is_nan());
    assert_eq!(newcomer.position[2], Point::new(0f64, 3f64));
    assert!(newcomer.position[3].x > 0f64);
}

#[test]
fn test_add_agents_counts_absent_slots() {
    let mut env = environment(&[Point::new(0f64, 0f64)], &[Point::new(5f64, 0f64)]);
    let mut crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();

    let slots = crowd
        .add_agents(
            &mut env,
            &[Point::new(1f64, 1f64), Point::new(0f64, 3f64)],
            &[Point::new(1f64, 1f64), Point::new(5f64, 3f64)],
        )
        .unwrap();

    assert_eq!(slots, vec![AgentSlot::Absent, AgentSlot::Registered(1)]);
    assert_eq!(crowd.agent_count(), 3);
    assert_eq!(crowd.registered_count(), 2);

    crowd.step(&mut env).unwrap();
    // The registered newcomer is read back through its own handle, not its slot index
    let newcomer = env.track(2).unwrap().latest().unwrap();
    assert_relative_eq!(newcomer.position.y, 3f64, epsilon = 1e-12);
    assert!(env.track(1).unwrap().latest().unwrap().position.x.is_nan());
}

#[test]
fn test_add_agents_rejects_mismatched_batch() {
    let mut env = environment(&[], &[]);
    let mut crowd = OrcaCrowd::new(RecordingSimulator::default(), &env).unwrap();
    let res = crowd.add_agents(&mut env, &[Point::new(0f64, 0f64)], &[]);
    assert_eq!(
        res,
        Err(CrowdSimError::BatchLengthMismatch {
            positions: 1,
            destinations: 0
        })
    );
    assert_eq!(crowd.agent_count(), 0);
    assert_eq!(env.num_pedestrians(), 0);
}

#[test]
fn test_invalid_time_step_is_a_configuration_error() {
    let env = environment(&[Point::new(0f64, 0f64)], &[Point::new(5f64, 0f64)]);
    let res = OrcaCrowd::from_environment(&env, 0f64);
    assert!(matches!(
        res,
        Err(CrowdSimError::InvalidParameter { name: "time_step", .. })
    ));
}
