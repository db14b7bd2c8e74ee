use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Poisson;

use crate::error::CrowdSimError;
use crate::{Point, Vec2f};

use std::time::Duration;

/// Decides how many agents a source releases over an interval
pub trait CrowdGenerator {
    fn get_number_to_spawn(&mut self, elapsed: Duration) -> usize;
}

/// Releases agents at a steady rate, carrying fractions over to the next interval.
pub struct MonotonicCrowd {
    /// Agents per second
    rate: f64,
    accumulated: f64,
}

impl MonotonicCrowd {
    pub fn new(rate: f64) -> Self {
        MonotonicCrowd {
            rate,
            accumulated: 0f64,
        }
    }
}

impl CrowdGenerator for MonotonicCrowd {
    fn get_number_to_spawn(&mut self, elapsed: Duration) -> usize {
        self.accumulated += self.rate * elapsed.as_secs_f64();
        let whole = self.accumulated.floor();
        self.accumulated -= whole;
        whole as usize
    }
}

/// Releases a Poisson distributed number of agents per interval.
pub struct PoissonCrowd {
    /// Mean agents per second
    rate: f64,
    rng: StdRng,
}

impl PoissonCrowd {
    pub fn new(rate: f64) -> Self {
        Self::with_rng(rate, StdRng::from_entropy())
    }

    /// Reproducible arrivals
    pub fn seeded(rate: f64, seed: u64) -> Self {
        Self::with_rng(rate, StdRng::seed_from_u64(seed))
    }

    fn with_rng(rate: f64, rng: StdRng) -> Self {
        PoissonCrowd { rate, rng }
    }
}

impl CrowdGenerator for PoissonCrowd {
    fn get_number_to_spawn(&mut self, elapsed: Duration) -> usize {
        let lambda = self.rate * elapsed.as_secs_f64();
        if lambda <= 0f64 {
            return 0;
        }
        match Poisson::new(lambda) {
            Ok(distribution) => {
                let count: f64 = self.rng.sample(distribution);
                count as usize
            }
            Err(error) => {
                log::warn!("Invalid arrival rate {}: {}", lambda, error);
                0
            }
        }
    }
}

/// Spawns pedestrians around `source` and sends them to `sink`.
pub struct SourceSink {
    pub source: Point,
    /// Spawn positions are uniform in `source ± source_range`
    pub source_range: Vec2f,
    pub sink: Point,
    pub crowd_generator: Box<dyn CrowdGenerator>,
    rng: StdRng,
}

impl SourceSink {
    pub fn new(
        source: Point,
        source_range: Vec2f,
        sink: Point,
        crowd_generator: Box<dyn CrowdGenerator>,
    ) -> Result<Self, CrowdSimError> {
        Self::with_rng(source, source_range, sink, crowd_generator, StdRng::from_entropy())
    }

    pub fn seeded(
        source: Point,
        source_range: Vec2f,
        sink: Point,
        crowd_generator: Box<dyn CrowdGenerator>,
        seed: u64,
    ) -> Result<Self, CrowdSimError> {
        Self::with_rng(source, source_range, sink, crowd_generator, StdRng::seed_from_u64(seed))
    }

    fn with_rng(
        source: Point,
        source_range: Vec2f,
        sink: Point,
        crowd_generator: Box<dyn CrowdGenerator>,
        rng: StdRng,
    ) -> Result<Self, CrowdSimError> {
        let finite = |v: &Vec2f| v.x.is_finite() && v.y.is_finite();
        if !finite(&source) || !finite(&sink) {
            return Err(CrowdSimError::Config("source and sink must be finite points".to_string()));
        }
        if !finite(&source_range) || source_range.x < 0f64 || source_range.y < 0f64 {
            return Err(CrowdSimError::Config(format!(
                "source range must be non-negative, got {:?}",
                source_range
            )));
        }
        Ok(SourceSink {
            source,
            source_range,
            sink,
            crowd_generator,
            rng,
        })
    }

    fn sample_offset(&mut self, range: f64) -> f64 {
        if range > 0f64 {
            self.rng.gen_range(-range..=range)
        } else {
            0f64
        }
    }

    /// Positions and destinations of the agents due over `elapsed`
    pub fn spawn(&mut self, elapsed: Duration) -> Result<(Vec<Point>, Vec<Point>), CrowdSimError> {
        let count = self.crowd_generator.get_number_to_spawn(elapsed);
        let mut positions = Vec::new();
        let mut destinations = Vec::new();
        positions
            .try_reserve_exact(count)
            .and_then(|_| destinations.try_reserve_exact(count))
            .map_err(|_| CrowdSimError::SpawnOverflow { count })?;

        for _ in 0..count {
            let dx = self.sample_offset(self.source_range.x);
            let dy = self.sample_offset(self.source_range.y);
            positions.push(self.source + Vec2f::new(dx, dy));
            destinations.push(self.sink);
        }
        Ok((positions, destinations))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic_crowd_carries_fractions() {
        let mut crowd = MonotonicCrowd::new(1f64);
        let half_second = Duration::from_millis(500);
        let spawned: Vec<usize> = (0..4).map(|_| crowd.get_number_to_spawn(half_second)).collect();
        assert_eq!(spawned, vec![0, 1, 0, 1]);
        assert_eq!(crowd.get_number_to_spawn(Duration::from_secs(3)), 3);
    }

    #[test]
    fn test_poisson_crowd_mean() {
        let mut crowd = PoissonCrowd::seeded(2f64, 42);
        assert_eq!(crowd.get_number_to_spawn(Duration::ZERO), 0);
        let total: usize = (0..1000).map(|_| crowd.get_number_to_spawn(Duration::from_secs(1))).sum();
        let mean = total as f64 / 1000f64;
        assert!((mean - 2f64).abs() < 0.3f64, "mean was {}", mean);
    }

    #[test]
    fn test_spawn_within_source_range() {
        let mut source_sink = SourceSink::seeded(
            Point::new(0f64, 0f64),
            Vec2f::new(1f64, 0f64),
            Point::new(10f64, 0f64),
            Box::new(MonotonicCrowd::new(5f64)),
            7,
        )
        .unwrap();
        let (positions, destinations) = source_sink.spawn(Duration::from_secs(1)).unwrap();
        assert_eq!(positions.len(), 5);
        assert_eq!(destinations, vec![Point::new(10f64, 0f64); 5]);
        for p in positions {
            assert!(p.x.abs() <= 1f64);
            assert_eq!(p.y, 0f64);
        }
    }

    #[test]
    fn test_oversized_batch_is_an_error() {
        let mut source_sink = SourceSink::new(
            Point::new(0f64, 0f64),
            Vec2f::new(0f64, 0f64),
            Point::new(10f64, 0f64),
            Box::new(MonotonicCrowd::new(1e30f64)),
        )
        .unwrap();
        match source_sink.spawn(Duration::from_secs(1)) {
            Err(CrowdSimError::SpawnOverflow { count }) => assert_eq!(count, usize::MAX),
            other => panic!("unexpected result {:?}", other.map(|(p, _)| p.len())),
        }
    }

    #[test]
    fn test_rejects_negative_range() {
        let res = SourceSink::new(
            Point::new(0f64, 0f64),
            Vec2f::new(-1f64, 0f64),
            Point::new(10f64, 0f64),
            Box::new(MonotonicCrowd::new(1f64)),
        );
        assert!(matches!(res, Err(CrowdSimError::Config(_))));
    }
}
