// Adapters layer: concrete collaborators for running protocols without hardware.

pub mod operator;
pub mod simulator;

pub use operator::{AutoResumeOperator, ConsoleOperator};
pub use simulator::{Command, SimulatedRobot};
