// Domain layer: enrollment models and the ports the engine consumes.

pub mod model;
pub mod ports;
