pub mod adapters;
pub mod app;
pub mod config;
pub mod core;
pub mod domain;
pub mod utils;

pub use adapters::{AutoResumeOperator, ConsoleOperator, SimulatedRobot};
pub use app::protocols::{CherrypickProtocol, LiquidSetupProtocol};
pub use config::{cli::LocalStorage, RunConfig};
#[cfg(feature = "cli")]
pub use config::CliConfig;

pub use core::{RunEngine, RunOutcome};
pub use utils::error::{DeckError, Result};
