use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::engine::{BodyId, BodyLabel, BodySpec, BodyState, EngineParams, SimulationEngine};
use crate::bus::{Envelope, MessageKind, Messenger, Target};
use crate::error::ProxyError;
use crate::models::Point;
use crate::outline::Frame;

/// Payload of `drag-start` and `drag-move`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Drag {
    pub id: BodyId,
    pub point: Point,
}

/// One add/remove/configure contract for every window.
///
/// With an engine (authority) commands apply directly and show up in the
/// next snapshot. Without one (follower) they are forwarded to the authority
/// and the local body list only changes when a snapshot arrives.
pub struct SimulationProxy {
    engine: Option<Box<dyn SimulationEngine>>,
    bodies: Vec<BodyState>,
    borders: Vec<BodyId>,
    // Pointer targets of bodies being dragged, local or remote.
    drags: HashMap<BodyId, Point>,
    grabbed: Option<BodyId>,
}

impl Default for SimulationProxy {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulationProxy {
    pub fn new() -> Self {
        SimulationProxy {
            engine: None,
            bodies: Vec::new(),
            borders: Vec::new(),
            drags: HashMap::new(),
            grabbed: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    /// Latest known body set: the engine's last step, or the last snapshot
    /// received from the authority.
    pub fn bodies(&self) -> &[BodyState] {
        &self.bodies
    }

    pub fn grabbed(&self) -> Option<BodyId> {
        self.grabbed
    }

    /// Takes ownership of the simulation. Non-border bodies from the last
    /// snapshot are recreated so they survive a change of authority.
    pub fn run(&mut self, mut engine: Box<dyn SimulationEngine>) {
        let mut carried = 0;
        for state in &self.bodies {
            if state.label == BodyLabel::Border {
                continue;
            }
            match engine.add(BodySpec::from_state(state)) {
                Ok(()) => carried += 1,
                Err(e) => warn!("sim: body not carried over: {e}"),
            }
        }
        info!("sim: engine started with {carried} carried bod(ies)");
        self.bodies = engine.snapshot();
        self.borders.clear();
        self.drags.clear();
        self.engine = Some(engine);
    }

    pub fn stop(&mut self) {
        if self.engine.take().is_some() {
            info!("sim: engine stopped");
        }
        self.borders.clear();
        self.drags.clear();
    }

    pub fn add(&mut self, bus: &Messenger, bodies: Vec<BodySpec>) -> Result<(), ProxyError> {
        let Some(engine) = self.engine.as_mut() else {
            bus.publish(MessageKind::EngineAdd, &bodies, Target::Authority)?;
            return Ok(());
        };
        let mut first = Ok(());
        for body in bodies {
            if let Err(e) = engine.add(body) {
                warn!("sim: add refused: {e}");
                first = first.and(Err(e));
            }
        }
        Ok(first?)
    }

    pub fn remove(&mut self, bus: &Messenger, ids: &[BodyId]) -> Result<(), ProxyError> {
        let Some(engine) = self.engine.as_mut() else {
            bus.publish(MessageKind::EngineRemove, &ids, Target::Authority)?;
            return Ok(());
        };
        let mut first = Ok(());
        for id in ids {
            self.drags.remove(id);
            if let Err(e) = engine.remove(*id) {
                warn!("sim: remove refused: {e}");
                first = first.and(Err(e));
            }
        }
        Ok(first?)
    }

    pub fn configure(&mut self, bus: &Messenger, params: &EngineParams) -> Result<(), ProxyError> {
        match self.engine.as_mut() {
            Some(engine) => engine.configure(params),
            None => bus.publish(MessageKind::EngineConfigure, params, Target::Authority)?,
        }
        Ok(())
    }

    /// Swaps the wall bodies for ones built from `frames`. Only the owner
    /// keeps walls; followers see them through snapshots.
    pub fn replace_border(&mut self, frames: &[Frame]) -> Result<(), ProxyError> {
        let Some(engine) = self.engine.as_mut() else {
            debug!("sim: border ignored without engine");
            return Ok(());
        };
        for id in self.borders.drain(..) {
            if let Err(e) = engine.remove(id) {
                warn!("sim: stale wall {id} not removed: {e}");
            }
        }
        for frame in frames {
            let wall = BodySpec::border(frame);
            let id = wall.id;
            engine.add(wall)?;
            self.borders.push(id);
        }
        debug!("sim: border rebuilt from {} frame(s)", frames.len());
        Ok(())
    }

    /// Removes every body except the walls.
    pub fn clear(&mut self, bus: &Messenger) -> Result<(), ProxyError> {
        let ids: Vec<BodyId> = self
            .bodies
            .iter()
            .filter(|b| b.label != BodyLabel::Border)
            .map(|b| b.id)
            .collect();
        if ids.is_empty() {
            return Ok(());
        }
        self.remove(bus, &ids)
    }

    /// Topmost non-border body under `p`.
    pub fn body_at(&self, p: Point) -> Option<&BodyState> {
        self.bodies
            .iter()
            .rev()
            .filter(|b| b.label != BodyLabel::Border)
            .find(|b| b.contains(p))
    }

    pub fn grab(&mut self, bus: &Messenger, p: Point) -> Result<Option<BodyId>, ProxyError> {
        let Some(id) = self.body_at(p).map(|b| b.id) else {
            return Ok(None);
        };
        self.grabbed = Some(id);
        let drag = Drag { id, point: p };
        if self.is_running() {
            self.drags.insert(id, p);
        } else {
            bus.publish(MessageKind::DragStart, &drag, Target::Authority)?;
        }
        Ok(Some(id))
    }

    pub fn drag_to(&mut self, bus: &Messenger, p: Point) -> Result<(), ProxyError> {
        let Some(id) = self.grabbed else {
            return Ok(());
        };
        if self.is_running() {
            self.drags.insert(id, p);
        } else {
            bus.publish(MessageKind::DragMove, &Drag { id, point: p }, Target::Authority)?;
        }
        Ok(())
    }

    pub fn release(&mut self, bus: &Messenger) -> Result<(), ProxyError> {
        let Some(id) = self.grabbed.take() else {
            return Ok(());
        };
        if self.is_running() {
            self.drags.remove(&id);
        } else {
            bus.publish(MessageKind::DragEnd, &id, Target::Authority)?;
        }
        Ok(())
    }

    /// Steps the owned engine by `dt_ms` and broadcasts the new snapshot to
    /// followers. Without an engine this does nothing.
    pub fn tick(&mut self, bus: &Messenger, dt_ms: f64) -> Result<(), ProxyError> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        let mut lost = Vec::new();
        for (id, target) in &self.drags {
            if engine.pull(*id, *target).is_err() {
                lost.push(*id);
            }
        }
        for id in lost {
            self.drags.remove(&id);
        }
        engine.step(dt_ms);
        self.bodies = engine.snapshot();
        bus.publish(MessageKind::EngineUpdate, &self.bodies, Target::Followers)?;
        Ok(())
    }

    /// Replaces the local body list with a snapshot from the authority.
    /// Ignored while this window runs the engine itself.
    pub fn apply_snapshot(&mut self, bodies: Vec<BodyState>) {
        if self.is_running() {
            debug!("sim: ignoring foreign snapshot");
            return;
        }
        self.bodies = bodies;
    }

    /// Handles the simulation message kinds. Returns false for kinds that
    /// aren't simulation traffic.
    pub fn dispatch(&mut self, bus: &Messenger, env: &Envelope) -> Result<bool, ProxyError> {
        match env.kind {
            MessageKind::EngineUpdate => self.apply_snapshot(env.decode()?),
            MessageKind::EngineAdd => self.add(bus, env.decode()?)?,
            MessageKind::EngineRemove => {
                let ids: Vec<BodyId> = env.decode()?;
                self.remove(bus, &ids)?
            }
            MessageKind::EngineConfigure => self.configure(bus, &env.decode()?)?,
            MessageKind::DragStart | MessageKind::DragMove => {
                let drag: Drag = env.decode()?;
                if self.is_running() {
                    self.drags.insert(drag.id, drag.point);
                }
            }
            MessageKind::DragEnd => {
                let id: BodyId = env.decode()?;
                self.drags.remove(&id);
            }
            _ => return Ok(false),
        }
        Ok(true)
    }
}
