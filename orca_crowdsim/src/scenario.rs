use std::time::Duration;

use yaml_rust::{Yaml, YamlLoader};

use crate::environment::Environment;
use crate::error::CrowdSimError;
use crate::orca_crowd::OrcaCrowd;
use crate::simulator::orca::OrcaSimulator;
use crate::simulator::params::SimulatorParams;
use crate::source_sink::source_sink::{CrowdGenerator, MonotonicCrowd, PoissonCrowd, SourceSink};
use crate::{Point, Vec2f};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArrivalDistribution {
    Monotonic,
    Poisson,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SourceConfig {
    pub source: Point,
    pub source_range: Vec2f,
    pub sink: Point,
    /// Agents per second
    pub rate: f64,
    pub distribution: ArrivalDistribution,
    pub seed: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PedestrianConfig {
    pub position: Point,
    pub destination: Point,
}

/// Everything needed to set up a crowd run
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioConfig {
    pub time_step: f64,
    pub pedestrian_radius: f64,
    pub obstacle_radius: f64,
    /// Obstacle centres
    pub obstacles: Vec<Point>,
    pub pedestrians: Vec<PedestrianConfig>,
    pub simulator: SimulatorParams,
    pub sources: Vec<SourceConfig>,
}

fn config_error(message: String) -> CrowdSimError {
    CrowdSimError::Config(message)
}

fn as_number(value: &Yaml) -> Option<f64> {
    match value {
        Yaml::Real(_) => value.as_f64(),
        Yaml::Integer(i) => Some(*i as f64),
        _ => None,
    }
}

fn required_number(doc: &Yaml, key: &str) -> Result<f64, CrowdSimError> {
    as_number(&doc[key]).ok_or_else(|| config_error(format!("`{}` must be a number", key)))
}

fn optional_number(doc: &Yaml, key: &str) -> Result<Option<f64>, CrowdSimError> {
    if matches!(doc[key], Yaml::BadValue | Yaml::Null) {
        return Ok(None);
    }
    required_number(doc, key).map(Some)
}

fn parse_point(value: &Yaml, what: &str) -> Result<Point, CrowdSimError> {
    let coordinates = value
        .as_vec()
        .ok_or_else(|| config_error(format!("{} must be a list [x, y]", what)))?;
    match coordinates.as_slice() {
        [x, y] => match (as_number(x), as_number(y)) {
            (Some(x), Some(y)) => Ok(Point::new(x, y)),
            _ => Err(config_error(format!("{} has non numeric coordinates", what))),
        },
        _ => Err(config_error(format!("{} must have exactly 2 coordinates", what))),
    }
}

fn list<'a>(doc: &'a Yaml, key: &str) -> Result<&'a [Yaml], CrowdSimError> {
    match &doc[key] {
        Yaml::BadValue | Yaml::Null => Ok(&[]),
        Yaml::Array(items) => Ok(items.as_slice()),
        _ => Err(config_error(format!("`{}` must be a list", key))),
    }
}

impl ScenarioConfig {
    /// Parses a scenario such as
    /// ```yaml
    /// time_step: 0.1
    /// pedestrian_radius: 0.3
    /// obstacle_radius: 1.0
    /// obstacles:
    ///   - [2.0, 0.0]
    /// pedestrians:
    ///   - position: [0.0, 0.0]
    ///     destination: [5.0, 0.0]
    /// ```
    /// with optional `simulator` overrides and `sources`.
    pub fn from_yaml(yaml_str: &str) -> Result<Self, CrowdSimError> {
        let docs = YamlLoader::load_from_str(yaml_str).map_err(|e| config_error(e.to_string()))?;
        let doc = docs
            .first()
            .ok_or_else(|| config_error("empty scenario document".to_string()))?;

        let time_step = required_number(doc, "time_step")?;
        let pedestrian_radius = required_number(doc, "pedestrian_radius")?;
        let obstacle_radius = optional_number(doc, "obstacle_radius")?.unwrap_or(0f64);

        let obstacles = list(doc, "obstacles")?
            .iter()
            .enumerate()
            .map(|(i, obstacle)| parse_point(obstacle, &format!("obstacle {}", i)))
            .collect::<Result<Vec<_>, _>>()?;
        if !obstacles.is_empty() && obstacle_radius <= 0f64 {
            return Err(config_error("`obstacle_radius` must be positive when obstacles are given".to_string()));
        }

        let pedestrians = list(doc, "pedestrians")?
            .iter()
            .enumerate()
            .map(|(i, pedestrian)| {
                Ok(PedestrianConfig {
                    position: parse_point(&pedestrian["position"], &format!("pedestrian {} position", i))?,
                    destination: parse_point(&pedestrian["destination"], &format!("pedestrian {} destination", i))?,
                })
            })
            .collect::<Result<Vec<_>, CrowdSimError>>()?;

        let mut simulator = SimulatorParams::for_pedestrians(time_step, pedestrian_radius);
        let overrides = &doc["simulator"];
        if !overrides.is_badvalue() {
            if let Some(v) = optional_number(overrides, "neighbor_dist")? {
                simulator.neighbor_dist = v;
            }
            if let Some(v) = optional_number(overrides, "max_neighbors")? {
                if v < 0f64 || v.fract() != 0f64 {
                    return Err(config_error(format!("`max_neighbors` must be a whole number, got {}", v)));
                }
                simulator.max_neighbors = v as usize;
            }
            if let Some(v) = optional_number(overrides, "time_horizon")? {
                simulator.time_horizon = v;
            }
            if let Some(v) = optional_number(overrides, "time_horizon_obst")? {
                simulator.time_horizon_obst = v;
            }
            if let Some(v) = optional_number(overrides, "max_speed")? {
                simulator.max_speed = v;
            }
        }
        simulator.validate()?;

        let sources = list(doc, "sources")?
            .iter()
            .enumerate()
            .map(|(i, source)| parse_source(source, i))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ScenarioConfig {
            time_step,
            pedestrian_radius,
            obstacle_radius,
            obstacles,
            pedestrians,
            simulator,
            sources,
        })
    }
}

fn parse_source(source: &Yaml, index: usize) -> Result<SourceConfig, CrowdSimError> {
    let source_range = if source["source_range"].is_badvalue() {
        Vec2f::zeros()
    } else {
        parse_point(&source["source_range"], &format!("source {} range", index))?
    };
    let distribution = match source["distribution"].as_str() {
        None | Some("monotonic") => ArrivalDistribution::Monotonic,
        Some("poisson") => ArrivalDistribution::Poisson,
        Some(other) => {
            return Err(config_error(format!("source {} has unknown distribution `{}`", index, other)));
        }
    };
    let seed = match &source["seed"] {
        Yaml::BadValue => None,
        Yaml::Integer(seed) if *seed >= 0 => Some(*seed as u64),
        _ => return Err(config_error(format!("source {} seed must be a non-negative integer", index))),
    };

    let rate = required_number(source, "rate")?;
    if !rate.is_finite() || rate < 0f64 {
        return Err(config_error(format!(
            "source {} rate must be a finite non-negative number, got {}",
            index, rate
        )));
    }

    Ok(SourceConfig {
        source: parse_point(&source["source"], &format!("source {}", index))?,
        source_range,
        sink: parse_point(&source["sink"], &format!("source {} sink", index))?,
        rate,
        distribution,
        seed,
    })
}

impl SourceConfig {
    fn build(&self) -> Result<SourceSink, CrowdSimError> {
        let generator: Box<dyn CrowdGenerator> = match (self.distribution, self.seed) {
            (ArrivalDistribution::Monotonic, _) => Box::new(MonotonicCrowd::new(self.rate)),
            (ArrivalDistribution::Poisson, Some(seed)) => Box::new(PoissonCrowd::seeded(self.rate, seed)),
            (ArrivalDistribution::Poisson, None) => Box::new(PoissonCrowd::new(self.rate)),
        };
        match self.seed {
            Some(seed) => SourceSink::seeded(self.source, self.source_range, self.sink, generator, seed),
            None => SourceSink::new(self.source, self.source_range, self.sink, generator),
        }
    }
}

/// A configured crowd run: the recorded environment, the ORCA crowd stepping it and the
/// sources feeding new pedestrians in.
pub struct Scenario {
    env: Environment,
    crowd: OrcaCrowd<OrcaSimulator>,
    source_sinks: Vec<SourceSink>,
    time_step: f64,
    step_duration: Duration,
}

impl Scenario {
    pub fn from_config(config: &ScenarioConfig) -> Result<Self, CrowdSimError> {
        let time_step = config.simulator.time_step;
        let step_duration =
            Duration::try_from_secs_f64(time_step).map_err(|e| CrowdSimError::InvalidParameter {
                name: "time_step",
                reason: format!("{} s is not a usable step length: {}", time_step, e),
            })?;

        let positions: Vec<Point> = config.pedestrians.iter().map(|p| p.position).collect();
        let destinations: Vec<Point> = config.pedestrians.iter().map(|p| p.destination).collect();
        let env = Environment::new(
            config.pedestrian_radius,
            config.obstacle_radius,
            config.obstacles.clone(),
            &positions,
            &destinations,
        )?;
        let crowd = OrcaCrowd::with_params(&env, config.simulator)?;
        let source_sinks = config
            .sources
            .iter()
            .map(SourceConfig::build)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Scenario {
            env,
            crowd,
            source_sinks,
            time_step,
            step_duration,
        })
    }

    pub fn from_yaml(yaml_str: &str) -> Result<Self, CrowdSimError> {
        Self::from_config(&ScenarioConfig::from_yaml(yaml_str)?)
    }

    /// Releases the pedestrians due this step, then steps the crowd.
    pub fn step(&mut self) -> Result<(), CrowdSimError> {
        for source_sink in self.source_sinks.iter_mut() {
            let (positions, destinations) = source_sink.spawn(self.step_duration)?;
            if !positions.is_empty() {
                self.crowd.add_agents(&mut self.env, &positions, &destinations)?;
            }
        }
        self.crowd.step(&mut self.env)
    }

    pub fn run(&mut self, steps: usize) -> Result<(), CrowdSimError> {
        for _ in 0..steps {
            self.step()?;
        }
        Ok(())
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn crowd(&self) -> &OrcaCrowd<OrcaSimulator> {
        &self.crowd
    }

    pub fn crowd_mut(&mut self) -> &mut OrcaCrowd<OrcaSimulator> {
        &mut self.crowd
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }
}
