use crate::Vec2f;

pub const EPSILON: f64 = 1e-5;

/// A directed line in velocity space. Permitted velocities lie on its left:
/// `det(direction, point - v) <= 0`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrcaLine {
    /// A point on the line
    pub point: Vec2f,
    /// Unit direction of the line
    pub direction: Vec2f,
}

impl OrcaLine {
    pub fn new(point: Vec2f, direction: Vec2f) -> Self {
        OrcaLine { point, direction }
    }

    /// How far `velocity` lies on the forbidden side. Negative when permitted.
    pub fn violation(&self, velocity: &Vec2f) -> f64 {
        det(&self.direction, &(self.point - velocity))
    }
}

/// 2D cross product
pub fn det(a: &Vec2f, b: &Vec2f) -> f64 {
    a.x * b.y - a.y * b.x
}

/// Optimises along line `line_no` subject to every earlier line and the speed circle.
/// Returns `None` when the constraints leave nothing on the line.
fn linear_program1(
    lines: &[OrcaLine],
    line_no: usize,
    radius: f64,
    opt_velocity: &Vec2f,
    direction_opt: bool,
) -> Option<Vec2f> {
    let line = &lines[line_no];
    let dot_product = line.point.dot(&line.direction);
    let discriminant = dot_product * dot_product + radius * radius - line.point.norm_squared();

    if discriminant < 0f64 {
        // Max speed circle fully invalidates the line
        return None;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot_product - sqrt_discriminant;
    let mut t_right = -dot_product + sqrt_discriminant;

    for other in &lines[..line_no] {
        let denominator = det(&line.direction, &other.direction);
        let numerator = det(&other.direction, &(line.point - other.point));

        if denominator.abs() <= EPSILON {
            // Parallel lines
            if numerator < 0f64 {
                return None;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0f64 {
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }

        if t_left > t_right {
            return None;
        }
    }

    let t = if direction_opt {
        if opt_velocity.dot(&line.direction) > 0f64 {
            t_right
        } else {
            t_left
        }
    } else {
        let t = line.direction.dot(&(opt_velocity - line.point));
        if t < t_left {
            t_left
        } else if t > t_right {
            t_right
        } else {
            t
        }
    };
    Some(line.point + line.direction * t)
}

/// Finds the velocity closest to `opt_velocity` inside the speed circle that satisfies every
/// line. With `direction_opt` set, `opt_velocity` is a unit direction to go as far as possible in.
///
/// Returns the index of the first line that could not be satisfied (`lines.len()` on success)
/// together with the best velocity found so far.
pub fn linear_program2(
    lines: &[OrcaLine],
    radius: f64,
    opt_velocity: &Vec2f,
    direction_opt: bool,
) -> (usize, Vec2f) {
    let mut result = if direction_opt {
        opt_velocity * radius
    } else if opt_velocity.norm_squared() > radius * radius {
        opt_velocity.normalize() * radius
    } else {
        *opt_velocity
    };

    for (i, line) in lines.iter().enumerate() {
        if line.violation(&result) > 0f64 {
            match linear_program1(lines, i, radius, opt_velocity, direction_opt) {
                Some(velocity) => result = velocity,
                None => return (i, result),
            }
        }
    }

    (lines.len(), result)
}

/// Infeasible case: minimises the largest violation of the agent lines from `begin_line`
/// onwards, keeping the first `num_obst_lines` lines (obstacles) as hard constraints.
pub fn linear_program3(
    lines: &[OrcaLine],
    num_obst_lines: usize,
    begin_line: usize,
    radius: f64,
    velocity: Vec2f,
) -> Vec2f {
    let mut result = velocity;
    let mut distance = 0f64;

    for i in begin_line..lines.len() {
        let line = &lines[i];
        if line.violation(&result) <= distance {
            continue;
        }

        let mut proj_lines: Vec<OrcaLine> = lines[..num_obst_lines].to_vec();

        for other in &lines[num_obst_lines..i] {
            let determinant = det(&line.direction, &other.direction);
            let point = if determinant.abs() <= EPSILON {
                if line.direction.dot(&other.direction) > 0f64 {
                    // Same direction, the other line adds nothing
                    continue;
                }
                (line.point + other.point) * 0.5f64
            } else {
                line.point
                    + line.direction * (det(&other.direction, &(line.point - other.point)) / determinant)
            };
            proj_lines.push(OrcaLine::new(point, (other.direction - line.direction).normalize()));
        }

        let direction = Vec2f::new(-line.direction.y, line.direction.x);
        let (fail, candidate) = linear_program2(&proj_lines, radius, &direction, true);
        // Only numerical error makes this fail; keep the previous result then.
        if fail >= proj_lines.len() {
            result = candidate;
        }

        distance = line.violation(&result);
    }

    result
}

/// Solves for the new velocity given all constraint lines, the first `num_obst_lines` of which
/// come from obstacles.
pub fn solve(lines: &[OrcaLine], num_obst_lines: usize, max_speed: f64, pref_velocity: &Vec2f) -> Vec2f {
    let (line_fail, velocity) = linear_program2(lines, max_speed, pref_velocity, false);
    if line_fail < lines.len() {
        linear_program3(lines, num_obst_lines, line_fail, max_speed, velocity)
    } else {
        velocity
    }
}
