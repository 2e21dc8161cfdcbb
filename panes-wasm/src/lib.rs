use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{LevelFilter, error, info, warn};
use panes_core::constants::{
    CHANNEL_NAME, MINIMAP_PADDING, MINIMAP_SCALE, MOVE_POLL_MS, REQUEST_TIMEOUT_MS,
};
use panes_core::{
    BodyLabel, BodySpec, Messenger, Node, Peer, PeerError, Point, SharedStore, WindowEvent,
    minimap,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{
    CanvasRenderingContext2d, Document, HtmlCanvasElement, KeyboardEvent, MouseEvent, Window,
};

mod browser;
mod canvas;
mod state;
mod utils;

use browser::{BroadcastTransport, BrowserSpawner, BrowserWindow, LocalStore};
use state::{STATE, State};
use utils::{debug_flag, sync_canvas_size};

fn report<T>(res: Result<T, PeerError>) {
    if let Err(e) = res {
        warn!("{e}");
    }
}

/// Screen-space position of a pointer event.
fn event_point(e: &MouseEvent, node: &Node<BrowserSpawner>) -> Point {
    let origin = node.peer().info().rect;
    Point::new(
        e.client_x() as f64 + origin.x,
        e.client_y() as f64 + origin.y,
    )
}

fn attach_events(state: Rc<RefCell<State>>) -> Result<(), JsValue> {
    let (window, canvas, node) = {
        let s = state.borrow();
        (s.window.clone(), s.canvas.clone(), s.node.clone())
    };

    {
        let node = node.clone();
        let onresize = Closure::<dyn FnMut()>::wrap(Box::new(move || {
            report(node.window_event(WindowEvent::Resized));
        }));
        window.add_event_listener_with_callback("resize", onresize.as_ref().unchecked_ref())?;
        onresize.forget();
    }
    {
        let st = state.clone();
        let poll = Closure::<dyn FnMut()>::wrap(Box::new(move || {
            let mut s = st.borrow_mut();
            let pos = BrowserWindow::screen_pos(&s.window);
            if pos != s.screen {
                s.screen = pos;
                report(s.node.window_event(WindowEvent::Moved));
            }
        }));
        window.set_interval_with_callback_and_timeout_and_arguments_0(
            poll.as_ref().unchecked_ref(),
            MOVE_POLL_MS,
        )?;
        poll.forget();
    }
    {
        let node = node.clone();
        let onunload = Closure::<dyn FnMut()>::wrap(Box::new(move || {
            report(node.window_event(WindowEvent::Closed));
        }));
        window.add_event_listener_with_callback("unload", onunload.as_ref().unchecked_ref())?;
        onunload.forget();
    }

    // Mouse events
    {
        let node = node.clone();
        let mousedown = Closure::<dyn FnMut(MouseEvent)>::wrap(Box::new(move |e: MouseEvent| {
            let at = event_point(&e, &node);
            match e.button() {
                0 => report(node.grab(at)),
                1 => {
                    e.prevent_default();
                    report(node.spawn(BodySpec::default_circle(at)));
                }
                _ => {}
            }
        }));
        canvas.add_event_listener_with_callback("mousedown", mousedown.as_ref().unchecked_ref())?;
        mousedown.forget();
    }
    {
        let node = node.clone();
        let mousemove = Closure::<dyn FnMut(MouseEvent)>::wrap(Box::new(move |e: MouseEvent| {
            if node.peer().sim().grabbed().is_some() {
                let at = event_point(&e, &node);
                report(node.drag_to(at));
            }
        }));
        canvas.add_event_listener_with_callback("mousemove", mousemove.as_ref().unchecked_ref())?;
        mousemove.forget();
    }
    {
        let node = node.clone();
        let mouseup = Closure::<dyn FnMut(MouseEvent)>::wrap(Box::new(move |_e: MouseEvent| {
            report(node.release());
        }));
        window.add_event_listener_with_callback("mouseup", mouseup.as_ref().unchecked_ref())?;
        mouseup.forget();
    }

    // Keyboard shortcuts
    {
        let st = state.clone();
        let keydown = Closure::<dyn FnMut(KeyboardEvent)>::wrap(Box::new(move |e: KeyboardEvent| {
            let node = st.borrow().node.clone();
            let mut settings = node.peer().settings().clone();
            match e.key().as_str() {
                "c" => return report(node.clear_bodies()),
                "s" => {
                    let r = node.peer().info().rect;
                    let at = Point::new(r.x + r.width / 2.0, r.y + r.height / 3.0);
                    return report(node.spawn(BodySpec::default_square(at)));
                }
                "b" => settings.enable_border = !settings.enable_border,
                "d" => settings.enable_debug = !settings.enable_debug,
                "m" => settings.show_minimap = !settings.show_minimap,
                _ => return,
            }
            report(node.update_settings(settings));
        }));
        window.add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref())?;
        keydown.forget();
    }
    Ok(())
}

fn draw(state: &State) {
    let (w, h) = sync_canvas_size(state);
    let dpr = state.window.device_pixel_ratio();
    let ctx = &state.ctx;
    let _ = ctx.set_transform(dpr, 0.0, 0.0, dpr, 0.0, 0.0);
    ctx.clear_rect(0.0, 0.0, w, h);

    let peer = state.node.peer();
    let own = peer.info();
    canvas::draw_background(ctx, w, h, &own.background);

    let origin = Point::new(own.rect.x, own.rect.y);
    let walls = state.debug || peer.settings().enable_debug;
    for body in peer.sim().bodies() {
        if body.label == BodyLabel::Border && !walls {
            continue;
        }
        if own.rect.intersects(&body.bounds()) {
            canvas::draw_body(ctx, body, origin);
        }
    }

    if peer.is_authority() {
        if peer.settings().show_minimap
            && let Some(map) = minimap::layout(peer.infos(), MINIMAP_SCALE, MINIMAP_PADDING)
        {
            canvas::draw_minimap(ctx, &map);
        }
        if peer.infos().len() <= 1 {
            canvas::draw_hint(ctx, w, h);
        }
    }
}

fn start_animation(state: Rc<RefCell<State>>) {
    type RafClosure = Closure<dyn FnMut(f64)>;
    let f: Rc<RefCell<Option<RafClosure>>> = Rc::new(RefCell::new(None));
    let g = f.clone();
    *g.borrow_mut() = Some(Closure::wrap(Box::new(move |_ts: f64| {
        {
            let s = state.borrow();
            report(s.node.tick(js_sys::Date::now()));
            draw(&s);
        }
        if let Some(window) = web_sys::window()
            && let Some(cb) = f.borrow().as_ref()
        {
            let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
        }
    }) as Box<dyn FnMut(f64)>));
    if let Some(window) = web_sys::window()
        && let Some(cb) = g.borrow().as_ref()
    {
        let _ = window.request_animation_frame(cb.as_ref().unchecked_ref());
    }
}

fn init_canvas(
    document: &Document,
) -> Result<(HtmlCanvasElement, CanvasRenderingContext2d), JsValue> {
    let cv = document
        .get_element_by_id("cv")
        .ok_or_else(|| JsValue::from_str("canvas #cv not found"))?
        .dyn_into::<HtmlCanvasElement>()?;
    let ctx = cv
        .get_context("2d")?
        .ok_or_else(|| JsValue::from_str("2D context not available"))?
        .dyn_into::<CanvasRenderingContext2d>()?;
    Ok((cv, ctx))
}

fn boot(window: Window, document: &Document, debug: bool) -> Result<(), JsValue> {
    let (canvas, ctx) = init_canvas(document)?;

    let transport = Rc::new(BroadcastTransport::open(CHANNEL_NAME)?);
    let bus = Messenger::new(transport.clone(), Some(REQUEST_TIMEOUT_MS));
    let store = SharedStore::new(Rc::new(LocalStore::new(&window)));
    let source = BrowserWindow::new(window.clone());
    let peer = Peer::new(bus, store, Box::new(source));
    let node = Rc::new(Node::new(peer, BrowserSpawner));
    {
        let node = node.clone();
        transport.on_envelope(move |env| report(node.receive(env)));
    }
    node.open(js_sys::Date::now())
        .map_err(|e| JsValue::from_str(&e.to_string()))?;
    info!(
        "window {} opened as {:?}",
        node.peer().id(),
        node.peer().role()
    );

    let state = Rc::new(RefCell::new(State {
        screen: BrowserWindow::screen_pos(&window),
        window,
        canvas,
        ctx,
        node,
        debug,
    }));
    STATE.with(|st| st.replace(Some(state.clone())));
    attach_events(state.clone())?;
    start_animation(state);
    Ok(())
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    let window = web_sys::window().ok_or("no window")?;
    let document = window.document().ok_or("no document")?;
    let debug = window
        .location()
        .search()
        .map(|s| debug_flag(&s))
        .unwrap_or(false);
    browser::init_logging(if debug {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    if !document.hidden() {
        return boot(window, &document, debug);
    }
    // Background tabs join once they are first shown.
    let booted = Rc::new(Cell::new(false));
    let doc = document.clone();
    let onvisible = Closure::<dyn FnMut()>::wrap(Box::new(move || {
        if booted.get() || doc.hidden() {
            return;
        }
        booted.set(true);
        if let Err(e) = boot(window.clone(), &doc, debug) {
            error!("boot failed: {e:?}");
        }
    }));
    document.add_event_listener_with_callback("visibilitychange", onvisible.as_ref().unchecked_ref())?;
    onvisible.forget();
    Ok(())
}

/// Removes every body except the walls.
#[wasm_bindgen]
pub fn clear_bodies() {
    STATE.with(|st| {
        if let Some(state) = st.borrow().as_ref() {
            let node = state.borrow().node.clone();
            report(node.clear_bodies());
        }
    });
}

/// Whether this tab currently runs the shared simulation.
#[wasm_bindgen]
pub fn is_authority() -> bool {
    STATE.with(|st| {
        st.borrow()
            .as_ref()
            .is_some_and(|s| s.borrow().node.peer().is_authority())
    })
}
