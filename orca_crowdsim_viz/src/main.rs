use std::time::Duration;

use nannou::prelude::*;
use orca_crowdsim::{square_obstacle, Scenario};

/// Pixels per metre
const SCALE: f32 = 30f32;

/// Two flows crossing around a column of pillars
const DEFAULT_SCENARIO: &str = "
time_step: 0.1
pedestrian_radius: 0.3
obstacle_radius: 0.8
obstacles:
  - [0, 2]
  - [0, -2]
pedestrians:
  - position: [-6, 0]
    destination: [6, 0]
  - position: [6, 0.2]
    destination: [-6, 0.2]
sources:
  - source: [-6, 0]
    source_range: [0, 3]
    sink: [6, 0]
    rate: 1.5
    distribution: poisson
  - source: [6, 0]
    source_range: [0, 3]
    sink: [-6, 0]
    rate: 1.5
    distribution: poisson
";

struct CrowdModel {
    scenario: Scenario,
    /// Wall time not yet simulated
    pending: Duration,
}

fn load_scenario() -> Result<Scenario, String> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading scenario from {}", path);
            let yaml = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path, e))?;
            Scenario::from_yaml(&yaml).map_err(|e| format!("{}: {}", path, e))
        }
        None => {
            log::info!("No scenario given, using the built in crossing");
            Scenario::from_yaml(DEFAULT_SCENARIO).map_err(|e| e.to_string())
        }
    }
}

fn create_crowd_model(_app: &App) -> CrowdModel {
    let scenario = match load_scenario() {
        Ok(scenario) => scenario,
        Err(error) => {
            log::error!("Could not load scenario: {}", error);
            std::process::exit(1);
        }
    };
    CrowdModel {
        scenario,
        pending: Duration::ZERO,
    }
}

fn main() {
    env_logger::init();
    nannou::app(create_crowd_model)
        .update(update)
        .simple_window(view)
        .size(800, 600)
        .run();
}

fn update(_app: &App, model: &mut CrowdModel, update: Update) {
    let time_step = Duration::from_secs_f64(model.scenario.time_step());
    model.pending += update.since_last;
    while model.pending >= time_step {
        model.pending -= time_step;
        if let Err(error) = model.scenario.step() {
            log::error!("Simulation step failed: {}", error);
            return;
        }
    }
}

fn view(app: &App, model: &CrowdModel, frame: Frame) {
    let draw = app.draw();
    draw.background().color(CORNFLOWERBLUE);

    let env = model.scenario.environment();
    for center in env.obstacles() {
        let corners = square_obstacle(*center, env.obstacle_radius())
            .map(|corner| pt2(corner.x as f32 * SCALE, corner.y as f32 * SCALE));
        draw.polygon().color(DARKSLATEGRAY).points(corners);
    }

    let diameter = 2f32 * env.ped_radius() as f32 * SCALE;
    for track in env.tracks() {
        draw.ellipse()
            .color(ORANGE)
            .x(track.destination().x as f32 * SCALE)
            .y(track.destination().y as f32 * SCALE)
            .w_h(diameter / 3f32, diameter / 3f32);

        // Arrived and skipped pedestrians have no position
        let position = match track.latest() {
            Some(frame) if frame.active => frame.position,
            _ => continue,
        };
        draw.ellipse()
            .color(PLUM)
            .x(position.x as f32 * SCALE)
            .y(position.y as f32 * SCALE)
            .w_h(diameter, diameter);
    }

    if let Err(error) = draw.to_frame(app, &frame) {
        log::error!("Failed to draw frame: {:?}", error);
    }
}
