use crate::error::CrowdSimError;
use crate::simulator::linear_program::{det, OrcaLine, EPSILON};
use crate::{ObstacleId, Point, Vec2f};

/// One vertex of a polygonal obstacle. The edge owned by a vertex runs to `next`.
#[derive(Clone, Copy, Debug)]
pub struct ObstacleVertex {
    pub point: Point,
    /// Unit direction of the edge towards the next vertex
    pub unit_dir: Vec2f,
    pub is_convex: bool,
    pub next: usize,
    pub prev: usize,
}

/// Signed area test: positive when `c` lies left of the line a->b
pub fn left_of(a: &Point, b: &Point, c: &Point) -> f64 {
    det(&(a - c), &(b - a))
}

/// Squared distance from `c` to the segment a-b
pub fn dist_sq_point_line_segment(a: &Point, b: &Point, c: &Point) -> f64 {
    let ab = b - a;
    let r = (c - a).dot(&ab) / ab.norm_squared();
    if r < 0f64 {
        (c - a).norm_squared()
    } else if r > 1f64 {
        (c - b).norm_squared()
    } else {
        (c - (a + ab * r)).norm_squared()
    }
}

/// Every obstacle edge known to a simulator, stored as linked vertex rings
#[derive(Default)]
pub struct ObstacleSet {
    vertices: Vec<ObstacleVertex>,
    processed: bool,
}

impl ObstacleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vertices(&self) -> &[ObstacleVertex] {
        &self.vertices
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    /// Adds a polygon given counter-clockwise. Two vertices make a double sided wall.
    pub fn add_polygon(&mut self, polygon: &[Point]) -> Result<ObstacleId, CrowdSimError> {
        if self.processed {
            return Err(CrowdSimError::ObstaclesAlreadyProcessed);
        }
        if polygon.len() < 2 {
            return Err(CrowdSimError::DegenerateObstacle(polygon.len()));
        }
        if let Some(p) = polygon.iter().find(|p| !p.x.is_finite() || !p.y.is_finite()) {
            return Err(CrowdSimError::NonFinitePosition { x: p.x, y: p.y });
        }

        let first = self.vertices.len();
        let n = polygon.len();
        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            let is_convex = n == 2 || left_of(&polygon[prev], &polygon[i], &polygon[next]) >= 0f64;
            let edge = polygon[next] - polygon[i];
            if edge.norm() <= EPSILON {
                return Err(CrowdSimError::DegenerateObstacle(n));
            }
            self.vertices.push(ObstacleVertex {
                point: polygon[i],
                unit_dir: edge.normalize(),
                is_convex,
                next: first + next,
                prev: first + prev,
            });
        }
        Ok(first)
    }

    /// Freezes the set. Stepping is only allowed afterwards.
    pub fn process(&mut self) -> Result<(), CrowdSimError> {
        if self.processed {
            return Err(CrowdSimError::ObstaclesAlreadyProcessed);
        }
        self.processed = true;
        log::info!("Processed {} obstacle vertices", self.vertices.len());
        Ok(())
    }

    /// Edges within `sqrt(range_sq)` of `position` that face it, nearest first.
    pub fn neighbours(&self, position: &Point, range_sq: f64) -> Vec<(f64, usize)> {
        let mut result: Vec<(f64, usize)> = self
            .vertices
            .iter()
            .enumerate()
            .filter_map(|(id, vertex)| {
                let next = &self.vertices[vertex.next];
                // Only the side the agent is on the right of is solid
                if left_of(&vertex.point, &next.point, position) >= 0f64 {
                    return None;
                }
                let dist_sq = dist_sq_point_line_segment(&vertex.point, &next.point, position);
                (dist_sq < range_sq).then_some((dist_sq, id))
            })
            .collect();
        result.sort_by(|(a, _), (b, _)| a.total_cmp(b));
        result
    }

    /// Builds the half-planes keeping an agent clear of nearby obstacle edges for
    /// `time_horizon_obst` seconds.
    pub fn orca_lines(
        &self,
        neighbours: &[(f64, usize)],
        position: &Point,
        velocity: &Vec2f,
        radius: f64,
        time_horizon_obst: f64,
    ) -> Vec<OrcaLine> {
        let mut lines: Vec<OrcaLine> = vec![];
        let inv_time_horizon_obst = 1f64 / time_horizon_obst;
        let radius_sq = radius * radius;

        for &(_, id) in neighbours {
            let mut obstacle1 = &self.vertices[id];
            let mut obstacle2 = &self.vertices[obstacle1.next];

            let relative_position1 = obstacle1.point - position;
            let relative_position2 = obstacle2.point - position;

            // Skip edges whose velocity obstacle earlier lines already cover
            let already_covered = lines.iter().any(|line| {
                det(&(relative_position1 * inv_time_horizon_obst - line.point), &line.direction)
                    - inv_time_horizon_obst * radius
                    >= -EPSILON
                    && det(&(relative_position2 * inv_time_horizon_obst - line.point), &line.direction)
                        - inv_time_horizon_obst * radius
                        >= -EPSILON
            });
            if already_covered {
                continue;
            }

            let dist_sq1 = relative_position1.norm_squared();
            let dist_sq2 = relative_position2.norm_squared();

            let obstacle_vector = obstacle2.point - obstacle1.point;
            let s = (-relative_position1).dot(&obstacle_vector) / obstacle_vector.norm_squared();
            let dist_sq_line = (-relative_position1 - obstacle_vector * s).norm_squared();

            let origin = Vec2f::zeros();
            if s < 0f64 && dist_sq1 <= radius_sq {
                // Collision with left vertex. Ignore if non-convex.
                if obstacle1.is_convex {
                    let direction = Vec2f::new(-relative_position1.y, relative_position1.x).normalize();
                    lines.push(OrcaLine::new(origin, direction));
                }
                continue;
            } else if s > 1f64 && dist_sq2 <= radius_sq {
                // Collision with right vertex. The next edge handles it unless convex and facing.
                if obstacle2.is_convex && det(&relative_position2, &obstacle2.unit_dir) >= 0f64 {
                    let direction = Vec2f::new(-relative_position2.y, relative_position2.x).normalize();
                    lines.push(OrcaLine::new(origin, direction));
                }
                continue;
            } else if (0f64..1f64).contains(&s) && dist_sq_line <= radius_sq {
                // Collision with the edge itself
                lines.push(OrcaLine::new(origin, -obstacle1.unit_dir));
                continue;
            }

            // No collision: compute the legs of the velocity obstacle
            let left_leg = |rel: &Vec2f, dist_sq: f64| {
                let leg = (dist_sq - radius_sq).sqrt();
                Vec2f::new(rel.x * leg - rel.y * radius, rel.x * radius + rel.y * leg) / dist_sq
            };
            let right_leg = |rel: &Vec2f, dist_sq: f64| {
                let leg = (dist_sq - radius_sq).sqrt();
                Vec2f::new(rel.x * leg + rel.y * radius, -rel.x * radius + rel.y * leg) / dist_sq
            };

            let mut left_leg_direction: Vec2f;
            let mut right_leg_direction: Vec2f;
            if s < 0f64 && dist_sq_line <= radius_sq {
                // Seen obliquely: the left vertex alone defines the velocity obstacle
                if !obstacle1.is_convex {
                    continue;
                }
                obstacle2 = obstacle1;
                left_leg_direction = left_leg(&relative_position1, dist_sq1);
                right_leg_direction = right_leg(&relative_position1, dist_sq1);
            } else if s > 1f64 && dist_sq_line <= radius_sq {
                // Seen obliquely: the right vertex alone defines the velocity obstacle
                if !obstacle2.is_convex {
                    continue;
                }
                obstacle1 = obstacle2;
                left_leg_direction = left_leg(&relative_position2, dist_sq2);
                right_leg_direction = right_leg(&relative_position2, dist_sq2);
            } else {
                left_leg_direction = if obstacle1.is_convex {
                    left_leg(&relative_position1, dist_sq1)
                } else {
                    -obstacle1.unit_dir
                };
                right_leg_direction = if obstacle2.is_convex {
                    right_leg(&relative_position2, dist_sq2)
                } else {
                    obstacle1.unit_dir
                };
            }

            // Legs must not point into the neighbouring edges; use their cut-off instead
            let left_neighbor = &self.vertices[obstacle1.prev];
            let mut is_left_leg_foreign = false;
            let mut is_right_leg_foreign = false;

            if obstacle1.is_convex && det(&left_leg_direction, &-left_neighbor.unit_dir) >= 0f64 {
                left_leg_direction = -left_neighbor.unit_dir;
                is_left_leg_foreign = true;
            }
            if obstacle2.is_convex && det(&right_leg_direction, &obstacle2.unit_dir) <= 0f64 {
                right_leg_direction = obstacle2.unit_dir;
                is_right_leg_foreign = true;
            }

            let left_cutoff = (obstacle1.point - position) * inv_time_horizon_obst;
            let right_cutoff = (obstacle2.point - position) * inv_time_horizon_obst;
            let cutoff_vec = right_cutoff - left_cutoff;
            let same_vertex = std::ptr::eq(obstacle1, obstacle2);

            // Project the current velocity on the velocity obstacle
            let t = if same_vertex {
                0.5f64
            } else {
                (velocity - left_cutoff).dot(&cutoff_vec) / cutoff_vec.norm_squared()
            };
            let t_left = (velocity - left_cutoff).dot(&left_leg_direction);
            let t_right = (velocity - right_cutoff).dot(&right_leg_direction);

            if (t < 0f64 && t_left < 0f64) || (same_vertex && t_left < 0f64 && t_right < 0f64) {
                // Project on the left cut-off circle
                let unit_w = (velocity - left_cutoff).normalize();
                let direction = Vec2f::new(unit_w.y, -unit_w.x);
                lines.push(OrcaLine::new(
                    left_cutoff + unit_w * (radius * inv_time_horizon_obst),
                    direction,
                ));
                continue;
            } else if t > 1f64 && t_right < 0f64 {
                // Project on the right cut-off circle
                let unit_w = (velocity - right_cutoff).normalize();
                let direction = Vec2f::new(unit_w.y, -unit_w.x);
                lines.push(OrcaLine::new(
                    right_cutoff + unit_w * (radius * inv_time_horizon_obst),
                    direction,
                ));
                continue;
            }

            // Project on the left leg, right leg or cut-off line, whichever is closest
            let dist_sq_cutoff = if t < 0f64 || t > 1f64 || same_vertex {
                f64::INFINITY
            } else {
                (velocity - (left_cutoff + cutoff_vec * t)).norm_squared()
            };
            let dist_sq_left = if t_left < 0f64 {
                f64::INFINITY
            } else {
                (velocity - (left_cutoff + left_leg_direction * t_left)).norm_squared()
            };
            let dist_sq_right = if t_right < 0f64 {
                f64::INFINITY
            } else {
                (velocity - (right_cutoff + right_leg_direction * t_right)).norm_squared()
            };

            let offset = |direction: &Vec2f| Vec2f::new(-direction.y, direction.x) * (radius * inv_time_horizon_obst);
            if dist_sq_cutoff <= dist_sq_left && dist_sq_cutoff <= dist_sq_right {
                let direction = -obstacle1.unit_dir;
                lines.push(OrcaLine::new(left_cutoff + offset(&direction), direction));
            } else if dist_sq_left <= dist_sq_right {
                if is_left_leg_foreign {
                    continue;
                }
                let direction = left_leg_direction;
                lines.push(OrcaLine::new(left_cutoff + offset(&direction), direction));
            } else {
                if is_right_leg_foreign {
                    continue;
                }
                let direction = -right_leg_direction;
                lines.push(OrcaLine::new(right_cutoff + offset(&direction), direction));
            }
        }

        lines
    }
}
