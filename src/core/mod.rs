pub mod allocator;
pub mod consumable;
pub mod engine;
pub mod executor;
pub mod mapper;
pub mod plate_map;
pub mod registry;
pub mod table;

pub use crate::domain::model::{LiquidDestination, RunReport, Transfer};
pub use crate::domain::ports::{Deck, Instrument, LiquidRegistry, Operator, Protocol, Storage};
pub use crate::utils::error::Result;
pub use engine::{RunEngine, RunOutcome};
