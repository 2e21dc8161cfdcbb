use std::cell::RefCell;
use std::rc::Rc;

use panes_core::Node;
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, Window};

use crate::browser::BrowserSpawner;

/// Per-tab runtime state stored behind an `Rc<RefCell<_>>` so it can be
/// shared across the WASM callbacks.
pub struct State {
    pub window: Window,
    pub canvas: HtmlCanvasElement,
    pub ctx: CanvasRenderingContext2d,
    pub node: Rc<Node<BrowserSpawner>>,
    pub debug: bool,
    /// Last polled `screenX`/`screenY`; browsers have no move event.
    pub screen: (f64, f64),
}

/// Thread local storage for the single runtime state instance.
thread_local! {
    pub static STATE: RefCell<Option<Rc<RefCell<State>>>> = const { RefCell::new(None) };
}
