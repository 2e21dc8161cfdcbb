//! The opaque physics engine and the proxy that hides who owns it.

mod engine;
mod proxy;
mod rapier;

pub use engine::{BodyId, BodyLabel, BodySpec, BodyState, EngineParams, Shape, SimulationEngine};
pub use proxy::{Drag, SimulationProxy};
pub use rapier::RapierEngine;
