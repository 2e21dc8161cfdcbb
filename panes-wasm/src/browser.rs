//! Browser implementations of the core's host seams.

use futures::task::{LocalFutureObj, LocalSpawn, SpawnError};
use log::{LevelFilter, Log, Metadata, Record, warn};
use panes_core::{BusError, Envelope, KeyValueStore, Rect, Transport, WindowSource};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;
use web_sys::{BroadcastChannel, MessageEvent, Storage, Window};

use crate::utils::js_number;

/// Bus transport over a same-origin `BroadcastChannel`. Envelopes travel as
/// JSON strings; the channel never echoes to the poster.
pub struct BroadcastTransport {
    channel: BroadcastChannel,
}

impl BroadcastTransport {
    pub fn open(name: &str) -> Result<Self, JsValue> {
        Ok(BroadcastTransport {
            channel: BroadcastChannel::new(name)?,
        })
    }

    pub fn on_envelope(&self, mut f: impl FnMut(Envelope) + 'static) {
        let onmessage = Closure::<dyn FnMut(MessageEvent)>::wrap(Box::new(move |e: MessageEvent| {
            let Some(text) = e.data().as_string() else {
                warn!("channel: ignoring non-text message");
                return;
            };
            match Envelope::from_json(&text) {
                Ok(env) => f(env),
                Err(err) => warn!("channel: {err}"),
            }
        }));
        self.channel
            .set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
        onmessage.forget();
    }
}

impl Transport for BroadcastTransport {
    fn post(&self, envelope: &Envelope) -> Result<(), BusError> {
        let json = envelope.to_json()?;
        self.channel
            .post_message(&JsValue::from_str(&json))
            .map_err(|e| BusError::Transport(format!("{e:?}")))
    }
}

/// `localStorage`, or nothing at all when the browser refuses access.
pub struct LocalStore {
    storage: Option<Storage>,
}

impl LocalStore {
    pub fn new(window: &Window) -> Self {
        let storage = window.local_storage().ok().flatten();
        if storage.is_none() {
            warn!("store: localStorage unavailable, running alone");
        }
        LocalStore { storage }
    }
}

impl KeyValueStore for LocalStore {
    fn is_available(&self) -> bool {
        self.storage.is_some()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.storage.as_ref()?.get_item(key).ok().flatten()
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(s) = &self.storage
            && let Err(e) = s.set_item(key, value)
        {
            warn!("store: write to {key:?} failed: {e:?}");
        }
    }

    fn delete(&self, key: &str) {
        if let Some(s) = &self.storage {
            let _ = s.remove_item(key);
        }
    }

    fn clear(&self) {
        if let Some(s) = &self.storage {
            let _ = s.clear();
        }
    }
}

/// This tab's viewport in screen coordinates.
pub struct BrowserWindow {
    window: Window,
}

impl BrowserWindow {
    pub fn new(window: Window) -> Self {
        BrowserWindow { window }
    }

    pub fn screen_pos(window: &Window) -> (f64, f64) {
        (js_number(window, "screenX"), js_number(window, "screenY"))
    }
}

impl WindowSource for BrowserWindow {
    fn rect(&self) -> Rect {
        let w = &self.window;
        let (sx, sy) = Self::screen_pos(w);
        let inner_w = js_number(w, "innerWidth");
        let inner_h = js_number(w, "innerHeight");
        // Chrome (tabs, toolbars) sits above and left of the viewport.
        let chrome_x = js_number(w, "outerWidth") - inner_w;
        let chrome_y = js_number(w, "outerHeight") - inner_h;
        Rect::new(sx + chrome_x, sy + chrome_y, inner_w, inner_h)
    }

    fn is_visible(&self) -> bool {
        self.window.document().is_some_and(|d| !d.hidden())
    }
}

/// Runs core futures on the page's microtask queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct BrowserSpawner;

impl LocalSpawn for BrowserSpawner {
    fn spawn_local_obj(&self, future: LocalFutureObj<'static, ()>) -> Result<(), SpawnError> {
        wasm_bindgen_futures::spawn_local(future);
        Ok(())
    }
}

/// `log` backend printing to the devtools console.
struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = JsValue::from_str(&format!("[{}] {}", record.target(), record.args()));
        match record.level() {
            log::Level::Error => web_sys::console::error_1(&line),
            log::Level::Warn => web_sys::console::warn_1(&line),
            log::Level::Info => web_sys::console::info_1(&line),
            _ => web_sys::console::debug_1(&line),
        }
    }

    fn flush(&self) {}
}

pub fn init_logging(level: LevelFilter) {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
