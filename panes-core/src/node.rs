use std::cell::{Ref, RefCell};
use std::rc::Rc;

use futures::task::{LocalSpawn, LocalSpawnExt};
use log::warn;

use crate::bus::Envelope;
use crate::error::PeerError;
use crate::models::{Point, Settings};
use crate::peer::{Peer, WindowEvent};
use crate::sim::BodySpec;

/// Drives a [`Peer`] from host events and runs its aggregations on a local
/// executor.
///
/// Every entry point borrows the peer only for the synchronous part; the
/// spawned refresh re-borrows it once all window infos are in.
pub struct Node<S: LocalSpawn> {
    peer: Rc<RefCell<Peer>>,
    spawner: S,
}

impl<S: LocalSpawn> Node<S> {
    pub fn new(peer: Peer, spawner: S) -> Self {
        Node {
            peer: Rc::new(RefCell::new(peer)),
            spawner,
        }
    }

    pub fn peer(&self) -> Ref<'_, Peer> {
        self.peer.borrow()
    }

    fn drive(&self, f: impl FnOnce(&mut Peer) -> Result<(), PeerError>) -> Result<(), PeerError> {
        let res = f(&mut self.peer.borrow_mut());
        self.schedule();
        res
    }

    /// Spawns the peer's pending aggregation, if any.
    fn schedule(&self) {
        let Some(plan) = self.peer.borrow_mut().take_refresh() else {
            return;
        };
        let peer = Rc::clone(&self.peer);
        let task = async move {
            let gathered = plan.gather().await;
            peer.borrow_mut().finish_refresh(gathered);
        };
        if let Err(e) = self.spawner.spawn_local(task) {
            warn!("node: refresh not spawned: {e}");
        }
    }

    pub fn open(&self, now: f64) -> Result<(), PeerError> {
        self.drive(|p| p.open(now))
    }

    pub fn receive(&self, envelope: Envelope) -> Result<(), PeerError> {
        self.drive(|p| p.receive(envelope))
    }

    pub fn window_event(&self, event: WindowEvent) -> Result<(), PeerError> {
        self.drive(|p| p.window_event(event))
    }

    pub fn tick(&self, now: f64) -> Result<(), PeerError> {
        self.drive(|p| p.tick(now))
    }

    pub fn close(&self) -> Result<(), PeerError> {
        self.drive(Peer::close)
    }

    pub fn update_settings(&self, settings: Settings) -> Result<(), PeerError> {
        self.drive(|p| p.update_settings(settings))
    }

    pub fn spawn(&self, body: BodySpec) -> Result<(), PeerError> {
        self.drive(|p| p.spawn(body))
    }

    pub fn clear_bodies(&self) -> Result<(), PeerError> {
        self.drive(Peer::clear_bodies)
    }

    pub fn grab(&self, at: Point) -> Result<bool, PeerError> {
        self.peer.borrow_mut().grab(at)
    }

    pub fn drag_to(&self, at: Point) -> Result<(), PeerError> {
        self.peer.borrow_mut().drag_to(at)
    }

    pub fn release(&self) -> Result<(), PeerError> {
        self.peer.borrow_mut().release()
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::LocalPool;

    use super::*;
    use crate::bus::Messenger;
    use crate::hub::LocalHub;
    use crate::models::Rect;
    use crate::peer::{Role, WindowSource};
    use crate::store::{MemoryStore, SharedStore};

    struct Fixed(Rect);

    impl WindowSource for Fixed {
        fn rect(&self) -> Rect {
            self.0
        }
        fn is_visible(&self) -> bool {
            true
        }
    }

    #[test]
    fn open_runs_one_refresh_on_the_pool() {
        let mut pool = LocalPool::new();
        let hub = LocalHub::new();
        let port = Rc::new(hub.port());
        let bus = Messenger::new(port, None);
        let store = SharedStore::new(Rc::new(MemoryStore::new()));
        let peer = Peer::new(bus, store, Box::new(Fixed(Rect::new(0.0, 0.0, 640.0, 480.0))));
        let node = Node::new(peer, pool.spawner());

        node.open(0.0).unwrap();
        assert_eq!(node.peer().role(), Role::Authority);
        assert_eq!(node.peer().recomputes(), 0);
        pool.run_until_stalled();
        assert_eq!(node.peer().recomputes(), 1);
        assert_eq!(node.peer().infos().len(), 1);
    }
}
