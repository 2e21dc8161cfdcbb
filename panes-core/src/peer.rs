//! One window's view of the election and of the shared play area.
//!
//! A [`Peer`] registers in the live set, claims authority when nobody holds
//! it, answers window-info requests and, while authority, aggregates every
//! window's rectangle into the border walls of the simulation.

use futures::future::join_all;
use log::{debug, info, warn};

use crate::bus::{Envelope, MessageKind, Messenger, PendingResponse, Target};
use crate::constants::{
    AUTHORITY_TIMEOUT_MS, BORDER_THICKNESS, HEARTBEAT_INTERVAL_MS, MAX_STEP_MS, MIN_STEP_MS,
};
use crate::error::{BusError, PeerError};
use crate::models::{Point, ProcessId, Rect, Settings, WindowInfo, WindowOpen};
use crate::outline::{self, Frame};
use crate::palette;
use crate::sim::{BodySpec, EngineParams, RapierEngine, SimulationEngine, SimulationProxy};
use crate::store::SharedStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Unregistered,
    Follower,
    Authority,
    Closed,
}

/// The host window as seen by its peer.
pub trait WindowSource {
    fn rect(&self) -> Rect;
    fn is_visible(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WindowEvent {
    Resized,
    Moved,
    Closed,
}

type EngineFactory = Box<dyn Fn() -> Box<dyn SimulationEngine>>;

/// Window-info requests issued for one aggregation, ready to be awaited.
pub struct RefreshPlan {
    seq: u64,
    own: WindowInfo,
    order: Vec<ProcessId>,
    requests: Vec<(ProcessId, PendingResponse)>,
}

/// What came back from a [`RefreshPlan`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gathered {
    /// Which plan this came from; later plans win.
    pub seq: u64,
    /// Infos in live set order.
    pub infos: Vec<WindowInfo>,
    /// Ids that never answered.
    pub missing: Vec<ProcessId>,
}

impl RefreshPlan {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Waits for every request. Unanswered ones are reported as missing,
    /// malformed answers are skipped.
    pub async fn gather(self) -> Gathered {
        let ids: Vec<ProcessId> = self.requests.iter().map(|(id, _)| *id).collect();
        let results = join_all(self.requests.into_iter().map(|(_, p)| p)).await;
        let mut answered = Vec::new();
        let mut missing = Vec::new();
        for (id, res) in ids.into_iter().zip(results) {
            match res {
                Ok(value) => match serde_json::from_value::<WindowInfo>(value) {
                    Ok(info) => answered.push(info),
                    Err(e) => warn!("peer: bad window info from {id}: {e}"),
                },
                Err(BusError::NoResponse(_)) => missing.push(id),
                Err(e) => warn!("peer: window info from {id} failed: {e}"),
            }
        }
        let mut infos = Vec::with_capacity(self.order.len());
        for id in &self.order {
            if *id == self.own.id {
                infos.push(self.own.clone());
            } else if let Some(i) = answered.iter().position(|w| w.id == *id) {
                infos.push(answered.swap_remove(i));
            }
        }
        Gathered {
            seq: self.seq,
            infos,
            missing,
        }
    }
}

pub struct Peer {
    id: ProcessId,
    role: Role,
    bus: Messenger,
    store: SharedStore,
    window: Box<dyn WindowSource>,
    sim: SimulationProxy,
    engine: EngineFactory,
    settings: Settings,
    background: (String, String),
    thickness: f64,
    infos: Vec<WindowInfo>,
    frames: Vec<Frame>,
    refresh_wanted: bool,
    planned: u64,
    applied: u64,
    recomputes: u64,
    clock: f64,
    opened_at: f64,
    last_beat: Option<f64>,
    last_step: Option<f64>,
}

impl Peer {
    pub fn new(bus: Messenger, store: SharedStore, window: Box<dyn WindowSource>) -> Self {
        Peer {
            id: ProcessId::new(),
            role: Role::Unregistered,
            bus,
            store,
            window,
            sim: SimulationProxy::new(),
            engine: Box::new(|| Box::new(RapierEngine::new())),
            settings: Settings::default(),
            background: palette::background(0),
            thickness: BORDER_THICKNESS,
            infos: Vec::new(),
            frames: Vec::new(),
            refresh_wanted: false,
            planned: 0,
            applied: 0,
            recomputes: 0,
            clock: 0.0,
            opened_at: 0.0,
            last_beat: None,
            last_step: None,
        }
    }

    pub fn with_engine(mut self, factory: impl Fn() -> Box<dyn SimulationEngine> + 'static) -> Self {
        self.engine = Box::new(factory);
        self
    }

    pub fn with_thickness(mut self, thickness: f64) -> Self {
        self.thickness = thickness;
        self
    }

    pub fn id(&self) -> ProcessId {
        self.id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_authority(&self) -> bool {
        self.role == Role::Authority
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Window infos from the last finished aggregation.
    pub fn infos(&self) -> &[WindowInfo] {
        &self.infos
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// How many aggregations have finished.
    pub fn recomputes(&self) -> u64 {
        self.recomputes
    }

    pub fn sim(&self) -> &SimulationProxy {
        &self.sim
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn info(&self) -> WindowInfo {
        WindowInfo {
            id: self.id,
            rect: self.window.rect(),
            visible: self.window.is_visible(),
            background: self.background.clone(),
        }
    }

    fn is_live(&self) -> bool {
        matches!(self.role, Role::Follower | Role::Authority)
    }

    pub fn open(&mut self, now: f64) -> Result<(), PeerError> {
        match self.role {
            Role::Unregistered => {}
            Role::Closed => return Err(PeerError::Closed),
            _ => return Ok(()),
        }
        self.clock = now;
        self.opened_at = now;
        self.bus.expire(now);
        self.background = palette::background(self.store.live_set().len());
        self.store.register(self.id);
        self.settings = self.store.settings();
        self.role = Role::Follower;
        info!("peer {}: opened", self.id);

        let announce = WindowOpen {
            id: self.id,
            rect: self.window.rect(),
        };
        self.bus
            .publish(MessageKind::WindowOpen, &announce, Target::Authority)?;
        if self.store.authority().is_none() {
            self.claim();
        }
        Ok(())
    }

    fn claim(&mut self) {
        if self.store.claim_authority(self.id) {
            self.promote();
        } else {
            debug!("peer {}: lost the claim", self.id);
        }
    }

    fn promote(&mut self) {
        info!("peer {}: became authority", self.id);
        self.role = Role::Authority;
        self.sim.run((self.engine)());
        let params = EngineParams::from(&self.settings);
        if let Err(e) = self.sim.configure(&self.bus, &params) {
            warn!("peer {}: engine configure failed: {e}", self.id);
        }
        self.store.beat(self.clock);
        self.last_beat = Some(self.clock);
        self.last_step = None;
        self.refresh_wanted = true;
    }

    fn demote(&mut self) {
        info!("peer {}: stepping down", self.id);
        self.role = Role::Follower;
        self.sim.stop();
        self.frames.clear();
        self.last_beat = None;
        self.rejoin();
    }

    /// Puts this window back into the live set after another peer pruned
    /// it, and tells the authority about it.
    fn rejoin(&mut self) {
        if !self.store.is_available() || self.store.live_set().contains(&self.id) {
            return;
        }
        info!("peer {}: rejoining the live set", self.id);
        self.store.register(self.id);
        if self.is_authority() {
            self.refresh_wanted = true;
            return;
        }
        let announce = WindowOpen {
            id: self.id,
            rect: self.window.rect(),
        };
        if let Err(e) = self
            .bus
            .publish(MessageKind::WindowOpen, &announce, Target::Authority)
        {
            warn!("peer {}: rejoin announce failed: {e}", self.id);
        }
    }

    /// Feeds one envelope from the transport.
    pub fn receive(&mut self, envelope: Envelope) -> Result<(), PeerError> {
        if !self.is_live() {
            return Ok(());
        }
        let Some(env) = self.bus.accept(envelope, self.is_authority()) else {
            return Ok(());
        };
        match env.kind {
            MessageKind::WindowOpen | MessageKind::WindowUpdate => {
                if self.is_authority() {
                    self.refresh_wanted = true;
                }
            }
            MessageKind::WindowClose => {
                if self.is_authority() {
                    self.refresh_wanted = true;
                } else if self.store.authority().is_none() {
                    self.claim();
                }
            }
            MessageKind::WindowInfo => {
                let wanted: ProcessId = env.decode()?;
                if wanted == self.id {
                    self.bus.respond(&self.info(), Target::Authority, env.id)?;
                }
            }
            // Unmatched response: nobody is waiting for it.
            MessageKind::Response => {}
            _ => {
                self.sim.dispatch(&self.bus, &env)?;
            }
        }
        Ok(())
    }

    pub fn window_event(&mut self, event: WindowEvent) -> Result<(), PeerError> {
        match event {
            WindowEvent::Closed => return self.close(),
            WindowEvent::Resized | WindowEvent::Moved => {}
        }
        if !self.is_live() {
            return Ok(());
        }
        if self.is_authority() {
            self.refresh_wanted = true;
        } else {
            self.bus
                .publish(MessageKind::WindowUpdate, &self.id, Target::Authority)?;
        }
        Ok(())
    }

    /// Leaves the group. Closing twice is a no-op.
    pub fn close(&mut self) -> Result<(), PeerError> {
        if !self.is_live() {
            self.role = Role::Closed;
            return Ok(());
        }
        self.store.unregister(self.id);
        if self.is_authority() {
            self.store.release_authority(self.id);
        }
        self.sim.stop();
        self.role = Role::Closed;
        info!("peer {}: closed", self.id);
        self.bus
            .publish(MessageKind::WindowClose, &self.id, Target::All)?;
        Ok(())
    }

    /// Frame timer: expires requests, keeps the election honest and, while
    /// authority, steps and broadcasts the simulation.
    pub fn tick(&mut self, now: f64) -> Result<(), PeerError> {
        if !self.is_live() {
            return Ok(());
        }
        self.clock = now;
        self.bus.expire(now);
        if self.store.is_available() {
            match self.role {
                Role::Authority => self.check_authority(now),
                _ => self.check_follower(now),
            }
            self.rejoin();
        }
        if !self.is_authority() {
            return Ok(());
        }
        let dt = self
            .last_step
            .map_or(MIN_STEP_MS, |t| now - t)
            .clamp(MIN_STEP_MS, MAX_STEP_MS);
        self.last_step = Some(now);
        self.sim.tick(&self.bus, dt)?;
        Ok(())
    }

    fn check_authority(&mut self, now: f64) {
        match self.store.authority() {
            // Somebody wrote after us; the last writer keeps the role.
            Some(other) if other != self.id => {
                warn!("peer {}: authority taken over by {other}", self.id);
                self.demote();
                return;
            }
            None if !self.store.claim_authority(self.id) => {
                self.demote();
                return;
            }
            _ => {}
        }
        if self
            .last_beat
            .is_none_or(|t| now - t >= HEARTBEAT_INTERVAL_MS)
        {
            self.store.beat(now);
            self.last_beat = Some(now);
        }
    }

    fn check_follower(&mut self, now: f64) {
        let Some(host) = self.store.authority() else {
            self.claim();
            return;
        };
        let last_seen = self
            .store
            .heartbeat()
            .unwrap_or(self.opened_at)
            .max(self.opened_at);
        if now - last_seen <= AUTHORITY_TIMEOUT_MS {
            return;
        }
        warn!("peer {}: authority {host} went silent", self.id);
        self.store.unregister(host);
        self.store.release_authority(host);
        self.claim();
    }

    /// Hands out the pending aggregation, if one is wanted and this peer is
    /// authority.
    pub fn take_refresh(&mut self) -> Option<RefreshPlan> {
        if !std::mem::take(&mut self.refresh_wanted) {
            return None;
        }
        self.begin_refresh()
    }

    pub fn begin_refresh(&mut self) -> Option<RefreshPlan> {
        if !self.is_authority() {
            return None;
        }
        let mut order: Vec<ProcessId> = Vec::new();
        for id in self.store.live_set() {
            if !order.contains(&id) {
                order.push(id);
            }
        }
        if !order.contains(&self.id) {
            order.push(self.id);
        }
        let me = self.id;
        let mut requests = Vec::new();
        for id in order.iter().filter(|id| **id != me) {
            match self
                .bus
                .request(MessageKind::WindowInfo, id, Target::Followers)
            {
                Ok(p) => requests.push((*id, p)),
                Err(e) => warn!("peer {}: window info request failed: {e}", self.id),
            }
        }
        self.planned += 1;
        debug!(
            "peer {}: refresh #{} over {} window(s)",
            self.id,
            self.planned,
            order.len()
        );
        Some(RefreshPlan {
            seq: self.planned,
            own: self.info(),
            order,
            requests,
        })
    }

    /// Applies a finished aggregation: prunes silent peers, rebuilds the
    /// outline and swaps the wall bodies.
    pub fn finish_refresh(&mut self, gathered: Gathered) {
        if !self.is_authority() {
            debug!("peer {}: dropping refresh after stepping down", self.id);
            return;
        }
        if gathered.seq < self.applied {
            debug!(
                "peer {}: dropping refresh #{} behind #{}",
                self.id, gathered.seq, self.applied
            );
            return;
        }
        self.applied = gathered.seq;
        for id in &gathered.missing {
            if self.store.unregister(*id) {
                info!("peer {}: pruned silent window {id}", self.id);
            }
        }
        self.settings = self.store.settings();
        self.infos = gathered.infos;
        let rects: Vec<Rect> = self
            .infos
            .iter()
            .filter(|w| w.visible)
            .map(|w| w.rect)
            .collect();
        self.frames = outline::borders(&rects, self.thickness);
        let walls: &[Frame] = if self.settings.enable_border {
            &self.frames
        } else {
            &[]
        };
        if let Err(e) = self.sim.replace_border(walls) {
            warn!("peer {}: border rebuild failed: {e}", self.id);
        }
        self.recomputes += 1;
    }

    /// Persists `settings` and pushes them to the engine.
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), PeerError> {
        self.store.save_settings(&settings);
        let params = EngineParams::from(&settings);
        self.settings = settings;
        self.sim.configure(&self.bus, &params)?;
        if self.is_authority() {
            self.refresh_wanted = true;
        } else if self.is_live() {
            self.bus
                .publish(MessageKind::WindowUpdate, &self.id, Target::Authority)?;
        }
        Ok(())
    }

    pub fn spawn(&mut self, body: BodySpec) -> Result<(), PeerError> {
        self.sim.add(&self.bus, vec![body])?;
        Ok(())
    }

    pub fn clear_bodies(&mut self) -> Result<(), PeerError> {
        self.sim.clear(&self.bus)?;
        Ok(())
    }

    pub fn grab(&mut self, at: Point) -> Result<bool, PeerError> {
        Ok(self.sim.grab(&self.bus, at)?.is_some())
    }

    pub fn drag_to(&mut self, at: Point) -> Result<(), PeerError> {
        self.sim.drag_to(&self.bus, at)?;
        Ok(())
    }

    pub fn release(&mut self) -> Result<(), PeerError> {
        self.sim.release(&self.bus)?;
        Ok(())
    }
}
