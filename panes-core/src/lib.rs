//! Coordination core for a set of same-origin windows sharing one physics
//! simulation: message bus, shared store, authority election, window
//! outline geometry and the simulation proxy.

pub mod bus;
pub mod constants;
pub mod error;
pub mod hub;
pub mod minimap;
pub mod models;
pub mod node;
pub mod outline;
pub mod palette;
pub mod peer;
pub mod sim;
pub mod store;

pub use bus::{CorrelationId, Envelope, MessageKind, Messenger, PendingResponse, Target, Transport};
pub use error::{BusError, EngineError, PeerError, ProxyError, StoreError};
pub use hub::{HubPort, LocalHub};
pub use models::{Bounds, Point, ProcessId, Rect, Settings, WindowInfo, WindowOpen};
pub use node::Node;
pub use outline::Frame;
pub use peer::{Gathered, Peer, RefreshPlan, Role, WindowEvent, WindowSource};
pub use sim::{
    BodyId, BodyLabel, BodySpec, BodyState, EngineParams, RapierEngine, SimulationEngine,
    SimulationProxy,
};
pub use store::{KeyValueStore, MemoryStore, SharedStore};
