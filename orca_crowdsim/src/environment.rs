use crate::error::CrowdSimError;
use crate::orca_crowd::initial_preferred_velocity;
use crate::{nan_point, Point, Vec2f};

/// One agent's state for a single time slot
#[derive(Clone, Copy, Debug)]
pub struct AgentFrame {
    pub position: Point,
    pub velocity: Vec2f,
    /// Heading in radians, `atan2(v.y, v.x)`
    pub direction: f64,
    pub arrived: bool,
    /// True while the agent is still walking
    pub active: bool,
}

impl AgentFrame {
    /// A frame for an agent with no state at this time
    pub fn missing() -> Self {
        AgentFrame {
            position: nan_point(),
            velocity: nan_point(),
            direction: f64::NAN,
            arrived: false,
            active: false,
        }
    }

    /// A standing agent at `position` that has not arrived yet
    pub fn spawn(position: Point) -> Self {
        AgentFrame {
            position,
            velocity: Vec2f::zeros(),
            direction: 0f64,
            arrived: false,
            active: true,
        }
    }

    /// The first frame of a pedestrian. Only pedestrians with a direction to walk in are active.
    pub fn seed(position: Point, destination: Point) -> Self {
        AgentFrame {
            active: initial_preferred_velocity(position, destination).is_some(),
            ..Self::spawn(position)
        }
    }
}

/// The recorded history of one pedestrian. All buffers have the same length.
#[derive(Clone, Debug)]
pub struct PedestrianTrack {
    destination: Point,
    pub position: Vec<Point>,
    pub velocity: Vec<Vec2f>,
    pub direction: Vec<f64>,
    pub arrive_flag: Vec<bool>,
    pub mask: Vec<bool>,
}

impl PedestrianTrack {
    fn new(destination: Point) -> Self {
        PedestrianTrack {
            destination,
            position: vec![],
            velocity: vec![],
            direction: vec![],
            arrive_flag: vec![],
            mask: vec![],
        }
    }

    fn push(&mut self, frame: &AgentFrame) {
        self.position.push(frame.position);
        self.velocity.push(frame.velocity);
        self.direction.push(frame.direction);
        self.arrive_flag.push(frame.arrived);
        self.mask.push(frame.active);
    }

    pub fn destination(&self) -> Point {
        self.destination
    }

    pub fn len(&self) -> usize {
        self.position.len()
    }

    pub fn is_empty(&self) -> bool {
        self.position.is_empty()
    }

    /// Newest recorded frame
    pub fn latest(&self) -> Option<AgentFrame> {
        let t = self.len().checked_sub(1)?;
        Some(AgentFrame {
            position: self.position[t],
            velocity: self.velocity[t],
            direction: self.direction[t],
            arrived: self.arrive_flag[t],
            active: self.mask[t],
        })
    }
}

/// Host environment: scene description plus the growing per-pedestrian trajectories.
pub struct Environment {
    ped_radius: f64,
    obstacle_radius: f64,
    obstacles: Vec<Point>,
    tracks: Vec<PedestrianTrack>,
    /// Length of the history every track was seeded with
    seed_len: usize,
    num_steps: usize,
}

impl Environment {
    /// Creates an environment whose pedestrians stand at `positions`, each seeded with one
    /// frame, heading for the matching entry of `destinations`.
    pub fn new(
        ped_radius: f64,
        obstacle_radius: f64,
        obstacles: Vec<Point>,
        positions: &[Point],
        destinations: &[Point],
    ) -> Result<Self, CrowdSimError> {
        if positions.len() != destinations.len() {
            return Err(CrowdSimError::BatchLengthMismatch {
                positions: positions.len(),
                destinations: destinations.len(),
            });
        }

        let tracks = positions
            .iter()
            .zip(destinations)
            .map(|(position, destination)| {
                let mut track = PedestrianTrack::new(*destination);
                track.push(&AgentFrame::seed(*position, *destination));
                track
            })
            .collect();

        Ok(Environment {
            ped_radius,
            obstacle_radius,
            obstacles,
            tracks,
            seed_len: 1,
            num_steps: 0,
        })
    }

    pub fn ped_radius(&self) -> f64 {
        self.ped_radius
    }

    pub fn obstacle_radius(&self) -> f64 {
        self.obstacle_radius
    }

    /// Obstacle centres
    pub fn obstacles(&self) -> &[Point] {
        &self.obstacles
    }

    pub fn num_obstacles(&self) -> usize {
        self.obstacles.len()
    }

    pub fn num_pedestrians(&self) -> usize {
        self.tracks.len()
    }

    pub fn num_steps(&self) -> usize {
        self.num_steps
    }

    /// Length shared by every history buffer
    pub fn history_len(&self) -> usize {
        self.seed_len + self.num_steps
    }

    pub fn tracks(&self) -> &[PedestrianTrack] {
        &self.tracks
    }

    pub fn track(&self, pedestrian: usize) -> Option<&PedestrianTrack> {
        self.tracks.get(pedestrian)
    }

    pub fn destination(&self, pedestrian: usize) -> Option<Point> {
        self.tracks.get(pedestrian).map(|track| track.destination)
    }

    pub fn latest_position(&self, pedestrian: usize) -> Option<Point> {
        self.tracks.get(pedestrian)?.position.last().copied()
    }

    /// Pedestrians whose newest mask entry is set
    pub fn active_count(&self) -> usize {
        self.tracks
            .iter()
            .filter(|track| track.mask.last().copied().unwrap_or(false))
            .count()
    }

    /// Appends one time slot. `frames` holds one entry per pedestrian, in pedestrian order.
    pub fn append_step(&mut self, frames: &[AgentFrame]) -> Result<(), CrowdSimError> {
        if frames.len() != self.tracks.len() {
            return Err(CrowdSimError::FrameCountMismatch {
                expected: self.tracks.len(),
                actual: frames.len(),
            });
        }
        for (track, frame) in self.tracks.iter_mut().zip(frames) {
            track.push(frame);
        }
        self.num_steps += 1;
        Ok(())
    }

    /// Adds a pedestrian that appears now. Earlier slots are padded with missing frames so
    /// the buffers stay aligned; the newest slot holds the seed frame.
    pub fn add_pedestrian(&mut self, position: Point, destination: Point) -> usize {
        let mut track = PedestrianTrack::new(destination);
        for _ in 1..self.history_len() {
            track.push(&AgentFrame::missing());
        }
        track.push(&AgentFrame::seed(position, destination));
        self.tracks.push(track);
        self.tracks.len() - 1
    }
}
