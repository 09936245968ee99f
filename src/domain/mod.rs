// Domain layer: records, deck value types and the ports the engine drives.

pub mod model;
pub mod ports;
