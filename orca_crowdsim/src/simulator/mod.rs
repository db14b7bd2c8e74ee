pub mod crowd_simulator;
pub mod linear_program;
pub mod obstacle;
pub mod orca;
pub mod params;
