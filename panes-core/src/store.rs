use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::constants::{HEARTBEAT_KEY, HOST_KEY, SETTINGS_KEY, WINDOWS_KEY};
use crate::error::StoreError;
use crate::models::{ProcessId, Settings};

/// Small string key/value store visible to every window of the origin.
///
/// Writes are synchronous and last-write-wins. Implementations that cannot
/// reach their medium behave as an empty store that ignores writes.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn delete(&self, key: &str);
    fn clear(&self);

    /// False when the medium is missing and the store degrades to no-ops.
    fn is_available(&self) -> bool {
        true
    }

    /// Replaces the value under `key` with `new` (deleting it for `None`) when
    /// the current value equals `expected`. Returns whether the write happened.
    ///
    /// The default is a plain read-then-write and therefore not atomic across
    /// processes; backends with a real primitive should override it.
    fn compare_and_set(&self, key: &str, expected: Option<&str>, new: Option<&str>) -> bool {
        if self.get(key).as_deref() != expected {
            return false;
        }
        match new {
            Some(v) => self.set(key, v),
            None => self.delete(key),
        }
        true
    }
}

/// In-memory backend. Clones share the same map, so several peers in one
/// thread can see each other's writes.
#[derive(Clone, Debug)]
pub struct MemoryStore {
    map: Option<Rc<RefCell<HashMap<String, String>>>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore {
            map: Some(Rc::new(RefCell::new(HashMap::new()))),
        }
    }

    /// A store whose medium is missing: reads see nothing, writes vanish.
    pub fn unavailable() -> Self {
        MemoryStore { map: None }
    }
}

impl KeyValueStore for MemoryStore {
    fn is_available(&self) -> bool {
        self.map.is_some()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.map.as_ref()?.borrow().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        if let Some(m) = &self.map {
            m.borrow_mut().insert(key.to_string(), value.to_string());
        }
    }

    fn delete(&self, key: &str) {
        if let Some(m) = &self.map {
            m.borrow_mut().remove(key);
        }
    }

    fn clear(&self) {
        if let Some(m) = &self.map {
            m.borrow_mut().clear();
        }
    }

    fn compare_and_set(&self, key: &str, expected: Option<&str>, new: Option<&str>) -> bool {
        let Some(m) = &self.map else {
            return false;
        };
        let mut m = m.borrow_mut();
        if m.get(key).map(String::as_str) != expected {
            return false;
        }
        match new {
            Some(v) => m.insert(key.to_string(), v.to_string()),
            None => m.remove(key),
        };
        true
    }
}

/// Typed view over a [`KeyValueStore`].
///
/// Strings are stored raw and everything else as JSON, so a value written by
/// any window reads back the same in every other one.
#[derive(Clone)]
pub struct SharedStore {
    backend: Rc<dyn KeyValueStore>,
}

impl SharedStore {
    pub fn new(backend: Rc<dyn KeyValueStore>) -> Self {
        SharedStore { backend }
    }

    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.backend.get(key) else {
            return Ok(None);
        };
        if raw.is_empty() {
            return Ok(None);
        }
        match serde_json::from_str::<T>(&raw) {
            Ok(v) => Ok(Some(v)),
            // Not JSON: treat the text itself as a string value.
            Err(err) => serde_json::from_value::<T>(Value::String(raw))
                .map(Some)
                .map_err(|_| StoreError::Decode {
                    key: key.to_string(),
                    source: err,
                }),
        }
    }

    /// Reads `key`, returning `fallback` when it is absent or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.try_get(key) {
            Ok(Some(v)) => v,
            Ok(None) => fallback,
            Err(e) => {
                warn!("store: {e}");
                fallback
            }
        }
    }

    fn encode<T: Serialize>(key: &str, value: &T) -> Result<String, StoreError> {
        let v = serde_json::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        Ok(match v {
            Value::String(s) => s,
            other => other.to_string(),
        })
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        match Self::encode(key, value) {
            Ok(raw) => self.backend.set(key, &raw),
            Err(e) => warn!("store: {e}"),
        }
    }

    pub fn delete(&self, key: &str) {
        self.backend.delete(key);
    }

    pub fn clear(&self) {
        self.backend.clear();
    }

    pub fn authority(&self) -> Option<ProcessId> {
        self.get(HOST_KEY, None)
    }

    pub fn set_authority(&self, id: Option<ProcessId>) {
        match id {
            Some(id) => self.set(HOST_KEY, &id),
            None => self.delete(HOST_KEY),
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_available()
    }

    /// Writes `id` as authority if the record is empty, then reads it back.
    /// Without a store every process is alone and always wins.
    pub fn claim_authority(&self, id: ProcessId) -> bool {
        if !self.is_available() {
            return true;
        }
        let raw = id.to_string();
        self.backend.compare_and_set(HOST_KEY, None, Some(&raw));
        self.authority() == Some(id)
    }

    /// Clears the record only while it still names `id`.
    pub fn release_authority(&self, id: ProcessId) -> bool {
        let raw = id.to_string();
        self.backend.compare_and_set(HOST_KEY, Some(&raw), None)
    }

    pub fn live_set(&self) -> Vec<ProcessId> {
        self.get(WINDOWS_KEY, Vec::new())
    }

    pub fn register(&self, id: ProcessId) {
        let mut ids = self.live_set();
        ids.push(id);
        self.set(WINDOWS_KEY, &ids);
    }

    /// Removes `id` from the live set; returns false when it wasn't listed.
    pub fn unregister(&self, id: ProcessId) -> bool {
        let mut ids = self.live_set();
        let Some(idx) = ids.iter().position(|w| *w == id) else {
            return false;
        };
        ids.remove(idx);
        self.set(WINDOWS_KEY, &ids);
        true
    }

    pub fn settings(&self) -> Settings {
        self.get(SETTINGS_KEY, Settings::default())
    }

    pub fn save_settings(&self, settings: &Settings) {
        self.set(SETTINGS_KEY, settings);
    }

    pub fn heartbeat(&self) -> Option<f64> {
        self.get(HEARTBEAT_KEY, None)
    }

    pub fn beat(&self, now: f64) {
        self.set(HEARTBEAT_KEY, &now);
    }
}
