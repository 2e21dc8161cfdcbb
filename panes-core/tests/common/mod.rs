//! Several peers on one thread, wired through a [`LocalHub`] and a shared
//! [`MemoryStore`].

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use futures::executor::{LocalPool, LocalSpawner};
use panes_core::constants::REQUEST_TIMEOUT_MS;
use panes_core::{
    HubPort, LocalHub, MemoryStore, Messenger, Node, Peer, ProcessId, Rect, Role, SharedStore,
    WindowSource,
};

/// Window whose rectangle the test can move.
#[derive(Clone)]
pub struct TestWindow {
    rect: Rc<Cell<Rect>>,
    visible: Rc<Cell<bool>>,
}

impl WindowSource for TestWindow {
    fn rect(&self) -> Rect {
        self.rect.get()
    }

    fn is_visible(&self) -> bool {
        self.visible.get()
    }
}

pub struct Window {
    pub node: Node<LocalSpawner>,
    pub port: Rc<HubPort>,
    pub source: TestWindow,
    crashed: bool,
}

impl Window {
    pub fn id(&self) -> ProcessId {
        self.node.peer().id()
    }

    pub fn role(&self) -> Role {
        self.node.peer().role()
    }

    pub fn move_to(&self, rect: Rect) {
        self.source.rect.set(rect);
    }
}

pub struct World {
    pub hub: LocalHub,
    pub store: MemoryStore,
    pub pool: LocalPool,
    pub windows: Vec<Window>,
}

impl World {
    pub fn new() -> Self {
        Self::with_store(MemoryStore::new())
    }

    pub fn with_store(store: MemoryStore) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();
        World {
            hub: LocalHub::new(),
            store,
            pool: LocalPool::new(),
            windows: Vec::new(),
        }
    }

    pub fn shared(&self) -> SharedStore {
        SharedStore::new(Rc::new(self.store.clone()))
    }

    /// Adds and opens a window at `now`, then delivers everything.
    pub fn open(&mut self, rect: Rect, now: f64) -> usize {
        let port = Rc::new(self.hub.port());
        let bus = Messenger::new(port.clone(), Some(REQUEST_TIMEOUT_MS));
        let source = TestWindow {
            rect: Rc::new(Cell::new(rect)),
            visible: Rc::new(Cell::new(true)),
        };
        let peer = Peer::new(bus, self.shared(), Box::new(source.clone()));
        let node = Node::new(peer, self.pool.spawner());
        node.open(now).expect("open");
        self.windows.push(Window {
            node,
            port,
            source,
            crashed: false,
        });
        self.settle();
        self.windows.len() - 1
    }

    /// Delivers queued envelopes and runs spawned refreshes until nothing
    /// moves anymore.
    pub fn settle(&mut self) {
        loop {
            self.pool.run_until_stalled();
            let mut delivered = false;
            for w in &self.windows {
                for env in w.port.drain() {
                    delivered = true;
                    if let Err(e) = w.node.receive(env) {
                        log::warn!("test: receive failed: {e}");
                    }
                }
            }
            if !delivered {
                break;
            }
        }
    }

    pub fn tick(&mut self, i: usize, now: f64) {
        self.windows[i].node.tick(now).expect("tick");
        self.settle();
    }

    /// Ticks every window that is still running.
    pub fn tick_all(&mut self, now: f64) {
        for w in &self.windows {
            if !w.crashed {
                w.node.tick(now).expect("tick");
            }
        }
        self.settle();
    }

    pub fn close(&mut self, i: usize) {
        self.windows[i].node.close().expect("close");
        self.windows[i].port.close();
        self.settle();
    }

    /// Vanishes without saying goodbye: no store cleanup, no messages.
    pub fn crash(&mut self, i: usize) {
        self.windows[i].port.close();
        self.windows[i].crashed = true;
    }

    pub fn authorities(&self) -> Vec<usize> {
        (0..self.windows.len())
            .filter(|&i| !self.windows[i].crashed && self.windows[i].role() == Role::Authority)
            .collect()
    }

    pub fn authority(&self) -> &Window {
        let all = self.authorities();
        assert_eq!(all.len(), 1, "expected exactly one authority");
        &self.windows[all[0]]
    }
}
